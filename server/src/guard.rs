//! Two-step authorization for the destructive `clear_graph` tool.
//!
//! A fresh random code is generated at process start. A caller must first
//! call with no `auth`, receive the code, and then re-call with
//! `auth = code + "_DELETE_THIS_GRAPH"`. Any mismatch rotates the code so a
//! leaked or guessed value cannot be replayed.

use rand::Rng;
use tokio::sync::Mutex;

const SUFFIX: &str = "_DELETE_THIS_GRAPH";

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| {
            let n: u8 = rng.gen_range(0..36);
            std::char::from_digit(n as u32, 36).unwrap()
        })
        .collect()
}

/// Outcome of a `clear_graph` authorization attempt.
pub enum GuardOutcome {
    /// No `auth` was supplied; here is the code to echo back.
    CodeIssued(String),
    /// `auth` did not match; here is the freshly rotated code.
    Rejected(String),
    /// `auth` matched; the caller may proceed.
    Authorized,
}

/// Owns the current clear-graph authorization code. Shared across all
/// sessions; rotation is a single atomic swap under a short-lived lock.
pub struct ClearGuard {
    code: Mutex<String>,
}

impl ClearGuard {
    pub fn new() -> Self {
        Self {
            code: Mutex::new(generate_code()),
        }
    }

    /// Evaluate a `clear_graph` call's `auth` argument against the current
    /// code, rotating it whenever the call does not result in authorization.
    pub async fn check(&self, auth: Option<&str>) -> GuardOutcome {
        let mut code = self.code.lock().await;

        let Some(auth) = auth else {
            return GuardOutcome::CodeIssued(code.clone());
        };

        let expected = format!("{}{}", *code, SUFFIX);
        if auth == expected {
            GuardOutcome::Authorized
        } else {
            *code = generate_code();
            GuardOutcome::Rejected(code.clone())
        }
    }

    /// Rotate the code after a successful clear, so the consumed code can
    /// never be replayed.
    pub async fn rotate(&self) {
        let mut code = self.code.lock().await;
        *code = generate_code();
    }
}

impl Default for ClearGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_with_no_auth_issues_a_code() {
        let guard = ClearGuard::new();
        match guard.check(None).await {
            GuardOutcome::CodeIssued(code) => assert_eq!(code.len(), 8),
            _ => panic!("expected CodeIssued"),
        }
    }

    #[tokio::test]
    async fn wrong_auth_rotates_the_code() {
        let guard = ClearGuard::new();
        let first_code = match guard.check(None).await {
            GuardOutcome::CodeIssued(code) => code,
            _ => panic!("expected CodeIssued"),
        };

        let second_code = match guard.check(Some("wrong")).await {
            GuardOutcome::Rejected(code) => code,
            _ => panic!("expected Rejected"),
        };

        assert_ne!(first_code, second_code);

        // The old code, even with the correct suffix, is now stale.
        let stale_auth = format!("{first_code}_DELETE_THIS_GRAPH");
        match guard.check(Some(&stale_auth)).await {
            GuardOutcome::Rejected(_) => {}
            _ => panic!("stale code must not authorize"),
        }
    }

    #[tokio::test]
    async fn correct_auth_authorizes() {
        let guard = ClearGuard::new();
        let code = match guard.check(None).await {
            GuardOutcome::CodeIssued(code) => code,
            _ => panic!("expected CodeIssued"),
        };

        let auth = format!("{code}_DELETE_THIS_GRAPH");
        match guard.check(Some(&auth)).await {
            GuardOutcome::Authorized => {}
            _ => panic!("expected Authorized"),
        }
    }

    #[tokio::test]
    async fn rotate_invalidates_the_authorized_code() {
        let guard = ClearGuard::new();
        let code = match guard.check(None).await {
            GuardOutcome::CodeIssued(code) => code,
            _ => panic!("expected CodeIssued"),
        };
        guard.rotate().await;

        let auth = format!("{code}_DELETE_THIS_GRAPH");
        match guard.check(Some(&auth)).await {
            GuardOutcome::Rejected(_) => {}
            _ => panic!("rotated code must reject the previous auth"),
        }
    }
}
