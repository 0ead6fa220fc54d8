//! Issuance and validation of short-lived pairing codes.
//!
//! A pairing session authenticates this server to the backend exactly once:
//! the operator enters the code on the dashboard, the backend calls back with
//! the code and validation token, and the session is consumed. Sessions
//! expire after ten minutes and are swept lazily; there is no background
//! timer.

use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;

/// Letters used in pairing codes; I and O are excluded as ambiguous.
const CODE_ALPHA: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
/// Digits used in pairing codes; 0 and 1 are excluded as ambiguous.
const CODE_DIGITS: &[u8] = b"23456789";
/// Alphabet for validation tokens; ambiguous glyphs excluded.
const TOKEN_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
/// Length of a validation token.
const TOKEN_LEN: usize = 32;
/// How long a pairing session stays valid.
const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// A live pairing attempt, keyed by its code.
#[derive(Debug, Clone)]
pub struct PairingSession {
    /// Six-character code shown to the operator (3 letters + 3 digits).
    pub code: String,
    /// High-entropy secret the backend must echo to consume the session.
    pub validation_token: String,
    pub(crate) created_at: Instant,
    /// Public IP advertised for this server.
    pub server_ip: String,
    /// Public port advertised for this server.
    pub server_port: u16,
}

impl PairingSession {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > SESSION_TTL
    }

    /// Code formatted for humans: `ABC-123`.
    pub fn formatted_code(&self) -> String {
        if self.code.len() == 6 {
            format!("{}-{}", &self.code[..3], &self.code[3..])
        } else {
            self.code.clone()
        }
    }

    /// Dashboard URL the operator can open to complete the pairing.
    pub fn pairing_url(&self, base_url: &str) -> String {
        format!(
            "{}/link/{}?token={}",
            base_url.trim_end_matches('/'),
            self.code,
            self.validation_token
        )
    }
}

/// Generates and tracks pairing sessions.
///
/// All operations are safe under concurrent callers: code generation retries
/// until the check-then-insert succeeds atomically, so two simultaneous
/// `create_pairing` calls can never issue the same live code.
#[derive(Debug, Default)]
pub struct PairingIssuer {
    sessions: DashMap<String, PairingSession>,
}

impl PairingIssuer {
    /// Create an empty issuer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new pairing session for the given server address.
    ///
    /// Regenerates the code until it does not collide with any live session;
    /// always succeeds.
    pub fn create_pairing(&self, server_ip: &str, server_port: u16) -> PairingSession {
        self.sweep_expired();
        loop {
            let code = generate_code();
            match self.sessions.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let session = PairingSession {
                        code,
                        validation_token: generate_token(),
                        created_at: Instant::now(),
                        server_ip: server_ip.to_string(),
                        server_port,
                    };
                    slot.insert(session.clone());
                    return session;
                }
            }
        }
    }

    /// Look up a live session by code, evicting it if it has expired.
    ///
    /// The code is normalized first (separators stripped, uppercased) so
    /// `abc-123` finds the session stored under `ABC123`.
    pub fn get_pairing(&self, code: &str) -> Option<PairingSession> {
        let code = normalize_code(code);
        let session = self.sessions.get(&code)?;
        if session.is_expired() {
            drop(session);
            self.sessions.remove(&code);
            return None;
        }
        Some(session.value().clone())
    }

    /// Validate a code/token pair and consume the session on success.
    ///
    /// Returns `true` only when a live session exists for the normalized code
    /// and the token matches exactly; the session is then removed (single
    /// use). A token mismatch leaves the session intact so a wrong-token
    /// replay cannot invalidate a legitimate later attempt; not-found and
    /// expired sessions are evicted.
    pub fn validate_and_consume(&self, code: &str, token: &str) -> bool {
        let code = normalize_code(code);
        let expired = match self.sessions.get(&code) {
            None => return false,
            Some(session) => session.is_expired(),
        };
        if expired {
            self.sessions.remove(&code);
            return false;
        }
        self.sessions
            .remove_if(&code, |_, session| session.validation_token == token)
            .is_some()
    }

    /// Remove a session unconditionally.
    pub fn cancel_pairing(&self, code: &str) {
        self.sessions.remove(&normalize_code(code));
    }

    /// Whether any live session exists.
    pub fn has_pending(&self) -> bool {
        self.sweep_expired();
        !self.sessions.is_empty()
    }

    /// Most recently created live session, if any.
    pub fn active_pairing(&self) -> Option<PairingSession> {
        self.sweep_expired();
        self.sessions
            .iter()
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone())
    }

    fn sweep_expired(&self) {
        self.sessions.retain(|_, session| !session.is_expired());
    }

    #[cfg(test)]
    fn backdate(&self, code: &str, by: Duration) {
        if let Some(mut session) = self.sessions.get_mut(&normalize_code(code)) {
            session.created_at -= by;
        }
    }
}

/// Strip separators and uppercase so user input matches stored codes.
fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Generate a six-character code: three letters then three digits.
fn generate_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(6);
    for _ in 0..3 {
        code.push(CODE_ALPHA[rng.random_range(0..CODE_ALPHA.len())] as char);
    }
    for _ in 0..3 {
        code.push(CODE_DIGITS[rng.random_range(0..CODE_DIGITS.len())] as char);
    }
    code
}

/// Generate a 32-character validation token.
fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}
