//! Parent authentication: a shared password, signed session tokens and a
//! per-IP rate limiter for the login route.

use std::sync::Arc;
use std::time::{Duration, Instant};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Subject carried by parent session tokens
const PARENT_SUBJECT: &str = "parent";

// ============================================================================
// Signed Session Tokens
// ============================================================================

/// Signed session token generator/validator
#[derive(Clone)]
pub struct TokenSigner {
    /// Secret key for HMAC signing (generated at startup)
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new() -> Self {
        // Generate a random 32-byte secret at startup
        use rand::RngCore;
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret }
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac
    }

    /// Create a signed token valid for `ttl_secs`.
    /// Format: base64(subject:expiry_ts:signature)
    pub fn create_token(&self, subject: &str, ttl_secs: u64) -> String {
        let expiry = Utc::now().timestamp() + ttl_secs as i64;
        self.create_token_expiring(subject, expiry)
    }

    fn create_token_expiring(&self, subject: &str, expiry: i64) -> String {
        use base64::Engine;

        let payload = format!("{}:{}", subject, expiry);
        let signature = self.mac(&payload).finalize().into_bytes();

        let token_data = format!(
            "{}:{}",
            payload,
            base64::engine::general_purpose::STANDARD.encode(signature)
        );
        base64::engine::general_purpose::URL_SAFE.encode(token_data)
    }

    /// Returns the subject if the token is authentic and not expired
    pub fn validate_token(&self, token: &str) -> Option<String> {
        use base64::Engine;

        let token_data = base64::engine::general_purpose::URL_SAFE.decode(token).ok()?;
        let token_str = String::from_utf8(token_data).ok()?;

        // Parse from the right: subject:expiry:signature
        let mut parts = token_str.rsplitn(3, ':');
        let signature_b64 = parts.next()?;
        let expiry: i64 = parts.next()?.parse().ok()?;
        let subject = parts.next()?;

        let now = Utc::now().timestamp();
        if now > expiry {
            warn!("Session token expired: {} > {}", now, expiry);
            return None;
        }

        let expected_sig = base64::engine::general_purpose::STANDARD.decode(signature_b64).ok()?;
        let payload = format!("{}:{}", subject, expiry);
        if self.mac(&payload).verify_slice(&expected_sig).is_err() {
            warn!("Session token signature invalid");
            return None;
        }

        Some(subject.to_string())
    }
}

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter entry: (request_count, window_start_time)
type RateLimitEntry = (u32, Instant);

/// Simple IP-based rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    /// IP -> (request_count, window_start)
    entries: Arc<DashMap<String, RateLimitEntry>>,
    /// Max requests per window
    max_requests: u32,
    /// Window duration
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window_duration: Duration::from_secs(window_secs),
        }
    }

    /// Check if request is allowed. Returns true if allowed, false if rate limited.
    pub fn check(&self, ip: &str) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: &str, now: Instant) -> bool {
        // Drop clients whose window has closed
        self.entries
            .retain(|_, (_, window_start)| now.duration_since(*window_start) <= self.window_duration);

        let mut entry = self.entries.entry(ip.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > self.window_duration {
            *count = 0;
            *window_start = now;
        }

        if *count >= self.max_requests {
            return false;
        }

        *count += 1;
        true
    }

    /// Failed logins count extra against the window
    pub fn record_failure(&self, ip: &str) {
        let now = Instant::now();
        let mut entry = self.entries.entry(ip.to_string()).or_insert((0, now));
        let (count, _) = entry.value_mut();
        *count = (*count).saturating_add(2);
    }
}

// ============================================================================
// Parent Login
// ============================================================================

/// Shared parent password check plus session issuing
#[derive(Clone)]
pub struct ParentAuth {
    password_hash: String,
    signer: TokenSigner,
    session_secs: u64,
}

impl ParentAuth {
    /// Hash the configured password once at startup
    pub fn new(password: &str, session_secs: u64) -> Result<Self, String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| format!("Failed to hash password: {}", e))?
            .to_string();

        Ok(Self {
            password_hash,
            signer: TokenSigner::new(),
            session_secs,
        })
    }

    /// Verify the password and issue a session token
    pub fn login(&self, password: &str) -> Option<String> {
        let parsed_hash = PasswordHash::new(&self.password_hash).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .ok()?;
        Some(self.signer.create_token(PARENT_SUBJECT, self.session_secs))
    }

    pub fn session_secs(&self) -> u64 {
        self.session_secs
    }

    pub fn authorize(&self, token: &str) -> bool {
        self.signer.validate_token(token).as_deref() == Some(PARENT_SUBJECT)
    }
}
