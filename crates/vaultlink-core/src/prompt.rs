//! Credential prompting seam.

use crate::models::Credential;

/// Host-provided prompt for the master credential.
///
/// The controller blocks on this call; the spawned server stays running and
/// reachable while input is awaited, and no session state is held locked.
pub trait CredentialPrompt {
    /// Ask the user for their credential, seeding the email input with the
    /// known address when there is one. `None` means the user cancelled.
    fn prompt(&mut self, seed_email: Option<&str>) -> Option<Credential>;
}
