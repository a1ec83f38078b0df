use uuid::Uuid;

/// Identity of the built-in AI coach. Seeded into the users table by the
/// migrations so foreign keys on messages and participant links hold for it
/// like for any human account. Messages addressed to this identity trigger
/// an automated reply.
pub const ASSISTANT_USER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_00a1);

/// Number of trial days granted at signup.
pub const TRIAL_DAYS: i64 = 7;
