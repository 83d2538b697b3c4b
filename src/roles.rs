//! Role and privilege levels used across the forum.
//!
//! Levels are plain numbers; a higher value implies every capability of the lower ones.
//! Use [role_name] for display and the `can_*` helpers for permission checks.
pub const LEVEL_USER: u8 = 1;
pub const LEVEL_MODERATOR: u8 = 5;
pub const LEVEL_ADMIN: u8 = 10;

/// Return the human‑readable role name for a numeric level.
pub fn role_name(level: u8) -> &'static str {
    match level {
        l if l >= LEVEL_ADMIN => "Admin",
        l if l >= LEVEL_MODERATOR => "Moderator",
        _ => "User",
    }
}

/// Editing or deleting something you did not write requires moderator rights.
pub fn can_moderate(level: u8) -> bool {
    level >= LEVEL_MODERATOR
}

/// Removing whole categories (and everything under them) is admin only.
pub fn can_administer(level: u8) -> bool {
    level >= LEVEL_ADMIN
}

/// Authors may always touch their own content; everyone else needs moderator rights.
pub fn can_modify(actor: &str, actor_level: u8, owner: &str) -> bool {
    actor == owner || can_moderate(actor_level)
}

/// Parse a level from either a role name or a number (used by the CLI).
pub fn parse_level(input: &str) -> Option<u8> {
    match input.trim().to_ascii_lowercase().as_str() {
        "user" => Some(LEVEL_USER),
        "moderator" | "mod" => Some(LEVEL_MODERATOR),
        "admin" => Some(LEVEL_ADMIN),
        other => other.parse::<u8>().ok().filter(|l| *l > 0),
    }
}
