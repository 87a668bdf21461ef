//! Forward-error-correction engine: scheme descriptors, the deterministic
//! group plan, parity generation, and the recovery solver.

pub mod parity;
pub mod plan;
pub mod recovery;

/// An immutable FEC scheme descriptor.
///
/// The `name` is the wire token carried in the START `F{SCHEME}` flag and
/// must match between peers exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FecScheme {
    pub name: &'static str,
    /// Chunks per group; 0 disables FEC.
    pub group_size: u32,
    /// Parity symbols per group (0–3).
    pub parity_count: u8,
    /// Whether the two-phase overlapping layout is used.
    pub overlap: bool,
}

/// FEC disabled.
pub const NONE: FecScheme = FecScheme {
    name: "NONE",
    group_size: 0,
    parity_count: 0,
    overlap: false,
};

/// One XOR parity per pair of chunks.
pub const BASIC_2: FecScheme = FecScheme {
    name: "BASIC_2",
    group_size: 2,
    parity_count: 1,
    overlap: false,
};

/// One XOR parity per four chunks.
pub const BASIC_4: FecScheme = FecScheme {
    name: "BASIC_4",
    group_size: 4,
    parity_count: 1,
    overlap: false,
};

/// Stride-3 main groups plus second-phase overlap groups, XOR only.
pub const OVERLAPPING_3: FecScheme = FecScheme {
    name: "OVERLAPPING_3",
    group_size: 3,
    parity_count: 1,
    overlap: true,
};

/// Overlapping layout with weighted secondary and tertiary parity on every
/// main group.
pub const STRONG_OVERLAPPING_3: FecScheme = FecScheme {
    name: "STRONG_OVERLAPPING_3",
    group_size: 3,
    parity_count: 3,
    overlap: true,
};

/// Fallback scheme when a START names a token this build does not know.
pub const DEFAULT_SCHEME: FecScheme = STRONG_OVERLAPPING_3;

pub const ALL_SCHEMES: [FecScheme; 5] = [
    NONE,
    BASIC_2,
    BASIC_4,
    OVERLAPPING_3,
    STRONG_OVERLAPPING_3,
];

impl FecScheme {
    /// Resolve a wire token to a known scheme.
    pub fn from_token(token: &str) -> Option<FecScheme> {
        ALL_SCHEMES.iter().find(|s| s.name == token).copied()
    }

    /// Whether the scheme produces no parity at all.
    pub fn is_none(&self) -> bool {
        self.group_size == 0 || self.parity_count == 0
    }
}
