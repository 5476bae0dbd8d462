//! Name-claim identity handshake.
//!
//! A guest session stays anonymous until the caller volunteers a name ("I'm
//! Marcus"). If that name maps to a registered user with a stored passphrase,
//! the next utterance is treated as the passphrase attempt. Three failed
//! attempts fall back to guest mode rather than locking the caller out.

use anyhow::Result;

use crate::auth::credentials::verify_passphrase;
use crate::auth::normalize::extract_claimed_name;
use crate::session::{IdentityStage, Session};
use crate::store::KvStore;
use crate::users;

const MAX_PASS_RETRIES: u8 = 3;

/// What the handshake did with the incoming utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Message was not part of the handshake; the chat pipeline should run.
    NotHandled,
    /// The handshake consumed the message and produced this reply.
    Reply(String),
}

/// Advance the handshake state machine with one caller utterance. Mutates
/// `session` in place; the caller is responsible for persisting it.
pub fn run(session: &mut Session, message: &str, store: &dyn KvStore) -> Result<HandshakeOutcome> {
    match session.identity.stage {
        IdentityStage::None => begin_claim(session, message, store),
        IdentityStage::AwaitPass => check_passphrase(session, message, store),
    }
}

fn begin_claim(session: &mut Session, message: &str, store: &dyn KvStore) -> Result<HandshakeOutcome> {
    let Some(claimed) = extract_claimed_name(message) else {
        return Ok(HandshakeOutcome::NotHandled);
    };
    let Some(user_id) = users::lookup_by_name(store, &claimed)? else {
        // Unknown name: let the conversation carry on as guest.
        return Ok(HandshakeOutcome::NotHandled);
    };
    let profile = users::get_profile(store, &user_id)?;
    // No stored credential means nothing to verify against; ignore the claim.
    if !profile.contains_key("pass_salt") || !profile.contains_key("pass_hash") {
        return Ok(HandshakeOutcome::NotHandled);
    }

    session.identity.stage = IdentityStage::AwaitPass;
    session.identity.candidate = Some(user_id);
    session.identity.retries = 0;
    tracing::debug!(name = %claimed, "identity claim, awaiting passphrase");
    Ok(HandshakeOutcome::Reply(
        "Before we go on — what's your passphrase?".to_string(),
    ))
}

fn check_passphrase(
    session: &mut Session,
    message: &str,
    store: &dyn KvStore,
) -> Result<HandshakeOutcome> {
    let Some(candidate) = session.identity.candidate.clone() else {
        session.identity.clear();
        return Ok(HandshakeOutcome::NotHandled);
    };
    let profile = users::get_profile(store, &candidate)?;
    let (Some(salt), Some(hash)) = (profile.get("pass_salt"), profile.get("pass_hash")) else {
        session.identity.clear();
        return Ok(HandshakeOutcome::NotHandled);
    };

    if verify_passphrase(salt, hash, message) {
        session.user_id = candidate.clone();
        session.identity.clear();
        users::touch_last_seen(store, &candidate)?;
        let name = profile
            .get("display_name")
            .or_else(|| profile.get("name"))
            .cloned()
            .unwrap_or_else(|| "friend".to_string());
        tracing::info!(user_id = %candidate, "identity verified");
        return Ok(HandshakeOutcome::Reply(format!(
            "Welcome back, {name}. It's good to hear from you. What's on your mind today?"
        )));
    }

    session.identity.retries += 1;
    if session.identity.retries >= MAX_PASS_RETRIES {
        session.identity.clear();
        tracing::info!("passphrase retries exhausted, continuing as guest");
        return Ok(HandshakeOutcome::Reply(
            "That's not matching what I have on file. No worries — we can keep talking, \
             and you can try again any time."
                .to_string(),
        ));
    }
    Ok(HandshakeOutcome::Reply(
        "Hmm, that doesn't match. Want to try the passphrase once more?".to_string(),
    ))
}
