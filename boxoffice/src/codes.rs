//! Ticket identifiers and admission codes.
//!
//! Codes are display artifacts: the QR payload is an unsigned URL without
//! expiry and there is no collision detection. Nothing here is suitable for
//! anti-fraud purposes.

use boxoffice_core::environment::{Clock, SystemClock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Prefix of every ticket id.
pub const TICKET_ID_PREFIX: &str = "TKT-";

const TICKET_ID_SUFFIX_LEN: usize = 8;
const BARCODE_LEN: u32 = 13;

/// Generates ticket ids and codes from an injected random source.
pub struct CodeGenerator {
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
    verify_base_url: String,
}

impl CodeGenerator {
    /// Generator seeded from OS entropy, using wall-clock time.
    #[must_use]
    pub fn new(verify_base_url: impl Into<String>) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            clock: Arc::new(SystemClock),
            verify_base_url: verify_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Deterministic random source, for tests.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Clock mixed into barcodes.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `TKT-` followed by 8 upper-case base-36 characters.
    #[must_use]
    pub fn new_ticket_id(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let suffix: String = (0..TICKET_ID_SUFFIX_LEN)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();
        format!("{TICKET_ID_PREFIX}{suffix}")
    }

    /// Six digits, uniform over `100000..=999999`.
    #[must_use]
    pub fn new_access_code(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(100_000..=999_999_u32).to_string()
    }

    /// Thirteen digits derived from `seed`, the current time and a random
    /// component.
    #[must_use]
    pub fn new_barcode(&self, seed: &str) -> String {
        let millis = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or_default();
        let noise: u64 = self.rng.lock().unwrap_or_else(PoisonError::into_inner).r#gen();
        let mixed = fnv1a(seed.as_bytes()) ^ millis.rotate_left(17) ^ noise;
        let modulus = 10_u64.pow(BARCODE_LEN);
        format!("{:0width$}", mixed % modulus, width = BARCODE_LEN as usize)
    }

    /// `<verify_base_url>/verify/<ticket_id>`
    #[must_use]
    pub fn new_qr_payload(&self, ticket_id: &str) -> String {
        format!("{}/verify/{ticket_id}", self.verify_base_url)
    }
}

impl std::fmt::Debug for CodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeGenerator")
            .field("verify_base_url", &self.verify_base_url)
            .finish_non_exhaustive()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}
