//! Terminal credential prompt.

use dialoguer::console::Term;
use dialoguer::{Input, Password};
use mdv_core::Credentials;
use mdv_remote::{CredentialPrompter, PromptRequest, PromptResponse};
use tokio::sync::oneshot;
use tracing::debug;

/// Asks for a username and password on stderr.
///
/// The questions run on the blocking pool; an interrupted or failed read
/// answers `None`, which the credential manager treats as a cancel.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl CredentialPrompter for TerminalPrompter {
    fn request(&self, request: PromptRequest, reply: oneshot::Sender<Option<PromptResponse>>) {
        tokio::task::spawn_blocking(move || {
            let answer = ask(&request).unwrap_or_else(|e| {
                debug!(error = %e, "Credential prompt aborted");
                None
            });
            // The manager may already have timed out.
            let _ = reply.send(answer);
        });
    }
}

fn ask(request: &PromptRequest) -> Result<Option<PromptResponse>, dialoguer::Error> {
    let term = Term::stderr();
    let location = format!("{}://{}", request.protocol, request.host);

    let mut input = Input::<String>::new().with_prompt(format!("Username for {location}"));
    if !request.default_username.is_empty() {
        input = input.default(request.default_username.clone());
    }
    let username = input.interact_text_on(&term)?;
    if username.trim().is_empty() {
        return Ok(None);
    }

    let password = Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact_on(&term)?;

    Ok(Some(PromptResponse {
        credentials: Credentials::password(username.trim(), password),
        // The store is in-memory, so the session cache is enough.
        remember: false,
    }))
}
