//! One full GM turn: prompt snapshot, provider call, state reconciliation.
//!
//! Lock discipline: the session mutex is held only for synchronous state
//! reads/writes, never across the provider call. Connections process
//! commands sequentially, so a session sees at most one turn at a time.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use dungeonterm_domain::room_for_floor;
use dungeonterm_shared::ServerMessage;

use crate::app::App;
use crate::infrastructure::ports::GmTurn;
use crate::infrastructure::prompts::build_system_prompt;
use crate::infrastructure::session::GameSession;

use super::postprocess::post_process_scene;

/// The first user message of a session: ask the GM for the opening scene.
pub fn opening_prompt(floor: u32, stage_name: Option<&str>) -> String {
    let room = room_for_floor(floor);
    let stage = stage_name.unwrap_or("the Shadowmere Depths");
    format!(
        "The party enters {stage}, Floor {floor}. Use [SCENE:set_map:{room}] to set the starting room, \
         then [SCENE:move_party:9:8] to place the party. Describe the opening scene — the environment, \
         atmosphere, and what the party sees. Have 1-2 companions react."
    )
}

fn send(tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) {
    if tx.try_send(msg).is_err() {
        tracing::warn!("Failed to send message, channel full or closed");
    }
}

/// Run one GM turn against a session, emitting every message to `tx` in
/// order: `stream_start`, streamed content, `hp_update`, injected scene
/// commands, `stream_end`.
pub async fn run_gm_turn(app: &App, session: &Arc<Mutex<GameSession>>, tx: &mpsc::Sender<ServerMessage>) {
    // Snapshot everything the provider needs, then release the lock.
    let (system_prompt, history, resume_id) = {
        let s = session.lock().await;
        let prompt = build_system_prompt(
            &app.prompts,
            &s.party,
            s.floor,
            s.in_combat,
            &s.party_hp,
            &s.locale,
            s.stage_name.as_deref(),
        );
        (prompt, s.conversation.clone(), s.provider_session_id.clone())
    };

    send(tx, ServerMessage::StreamStart);

    let sink_tx = tx.clone();
    let sink = move |msg: ServerMessage| {
        if sink_tx.try_send(msg).is_err() {
            tracing::warn!("Failed to stream message, channel full or closed");
        }
    };

    let invocation = app
        .gm
        .invoke(&system_prompt, &history, &sink, resume_id.as_deref());
    let turn: GmTurn = match tokio::time::timeout(app.config.turn_timeout, invocation).await {
        Ok(turn) => turn,
        Err(_) => {
            tracing::error!(timeout = ?app.config.turn_timeout, "GM turn timed out");
            let mut turn = GmTurn::default();
            turn.push_error("GM provider timed out", &sink);
            turn
        }
    };

    let injected = {
        let mut s = session.lock().await;

        if let Some(id) = &turn.provider_session_id {
            s.provider_session_id = Some(id.clone());
        }

        // HP deltas resolve against the authoritative map; unknown names
        // drop silently.
        let mut updates = Vec::new();
        for change in &turn.hp_changes {
            if let Some(update) = s.apply_hp(&change.name, change.delta) {
                updates.push(update);
            }
        }
        if !updates.is_empty() {
            send(tx, ServerMessage::HpUpdate { updates });
        }

        // Track scene state and sys-driven transitions from the turn.
        for msg in &turn.messages {
            match msg {
                ServerMessage::Scene { command, args } => s.update_scene(command, args),
                ServerMessage::Sys { text } => s.apply_sys_transitions(text),
                ServerMessage::XpGain { amount } => s.accumulate_xp(*amount),
                _ => {}
            }
        }

        let floor = s.floor;
        let injected = post_process_scene(&turn, &mut s, floor);
        for msg in &injected {
            if let ServerMessage::Scene { command, args } = msg {
                s.update_scene(command, args);
            }
        }

        s.add_assistant_message(&turn.raw_text);
        injected
    };

    for msg in injected {
        send(tx, msg);
    }
    send(tx, ServerMessage::StreamEnd);
}
