//! Leaderboard normalization
//!
//! Producers disagree on field names, nesting and number formats. Each logical
//! field is described by a [`FieldRule`]: an ordered list of extraction
//! attempts plus an interpretation of the raw value. The first attempt that
//! yields a present value wins; absent, empty, zero and `false` values count
//! as not present.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::ledger::Pubkey;
use crate::models::{ContributorRecord, XpBreakdown, XpCategory};

/// Category name attached when an entry carries no breakdown at all
pub const DEFAULT_CATEGORY: &str = "contributor";

/// One place a logical field may live in a leaderboard entry
#[derive(Debug, Clone, Copy)]
enum Extraction {
    /// A top-level key
    Key(&'static str),
    /// `map[key]` for the first key present in a nested object
    Nested {
        map: &'static str,
        keys: &'static [&'static str],
    },
    /// The first non-empty string value of a nested object (in insertion
    /// order) or array
    FirstStringIn(&'static str),
}

impl Extraction {
    fn candidates<'a>(&self, item: &'a Map<String, Value>) -> Vec<&'a Value> {
        match *self {
            Extraction::Key(key) => item.get(key).into_iter().collect(),
            Extraction::Nested { map, keys } => item
                .get(map)
                .and_then(Value::as_object)
                .map(|nested| keys.iter().filter_map(|k| nested.get(*k)).collect())
                .unwrap_or_default(),
            Extraction::FirstStringIn(map) => {
                let is_filled = |v: &&Value| v.as_str().is_some_and(|s| !s.is_empty());
                let found = match item.get(map) {
                    Some(Value::Object(nested)) => nested.values().find(is_filled),
                    Some(Value::Array(nested)) => nested.iter().find(is_filled),
                    _ => None,
                };
                found.into_iter().collect()
            }
        }
    }
}

/// Ordered extraction attempts for one logical field
struct FieldRule<T> {
    attempts: &'static [Extraction],
    interpret: fn(&Value) -> Option<T>,
}

impl<T> FieldRule<T> {
    fn resolve(&self, item: &Map<String, Value>) -> Option<T> {
        self.attempts
            .iter()
            .flat_map(|attempt| attempt.candidates(item))
            .find_map(self.interpret)
    }
}

const USERNAME: FieldRule<String> = FieldRule {
    attempts: &[
        Extraction::Key("github_username"),
        Extraction::Key("githubUsername"),
        Extraction::Key("username"),
        Extraction::Key("github"),
    ],
    interpret: non_empty_string,
};

/// Used whenever the entry carries a `wallets` collection, even an unusable one
const WALLETS: FieldRule<String> = FieldRule {
    attempts: &[
        Extraction::Nested {
            map: "wallets",
            keys: &["sol", "solana"],
        },
        Extraction::FirstStringIn("wallets"),
    ],
    interpret: non_empty_string,
};

const WALLET: FieldRule<String> = FieldRule {
    attempts: &[
        Extraction::Key("wallet"),
        Extraction::Key("wallet_address"),
        Extraction::Key("walletAddress"),
        Extraction::Key("address"),
    ],
    interpret: non_empty_string,
};

const TOTAL_XP: FieldRule<f64> = FieldRule {
    attempts: &[
        Extraction::Key("score"),
        Extraction::Key("xp"),
        Extraction::Key("totalXp"),
        Extraction::Key("total_xp"),
        Extraction::Key("points"),
    ],
    interpret: present_number,
};

const ROLE_XP: FieldRule<Value> = FieldRule {
    attempts: &[
        Extraction::Key("role_xp"),
        Extraction::Key("roleXp"),
        Extraction::Key("roles"),
    ],
    interpret: present_value,
};

const DOMAIN_XP: FieldRule<Value> = FieldRule {
    attempts: &[
        Extraction::Key("domain_xp"),
        Extraction::Key("domainXp"),
        Extraction::Key("domains"),
    ],
    interpret: present_value,
};

const SKILL_XP: FieldRule<Value> = FieldRule {
    attempts: &[
        Extraction::Key("skill_xp"),
        Extraction::Key("skillXp"),
        Extraction::Key("skills"),
    ],
    interpret: present_value,
};

/// Legacy per-activity scores, remapped into `role` under these names
const LEGACY_SCORES: &[(&str, &str)] = &[
    ("prScore", "pr"),
    ("issueScore", "issue"),
    ("reviewScore", "review"),
    ("commentScore", "comment"),
];

/// Why an entry was dropped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("missing username")]
    MissingUsername,

    #[error("missing wallet")]
    MissingWallet,

    #[error("invalid wallet address {0}")]
    InvalidWallet(String),

    #[error("total XP must be positive")]
    NonPositiveXp,
}

/// Parse an arbitrary leaderboard payload into canonical records.
///
/// Accepts a bare array, `{ "leaderboard": [...] }` or `{ "contributors": [...] }`.
/// Any other shape yields no records. Invalid entries are dropped individually.
pub fn normalize(payload: &Value) -> Vec<ContributorRecord> {
    let entries = match payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match ["leaderboard", "contributors"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
        {
            Some(items) => items.as_slice(),
            None => {
                warn!("Leaderboard payload has no recognised contributor list");
                return Vec::new();
            }
        },
        _ => {
            warn!("Leaderboard payload is neither an array nor an object");
            return Vec::new();
        }
    };

    let records: Vec<ContributorRecord> = entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match parse_contributor(entry) {
            Ok(record) => Some(record),
            Err(reason) => {
                warn!(index, %reason, "Dropping leaderboard entry");
                None
            }
        })
        .collect();

    debug!(
        parsed = records.len(),
        dropped = entries.len() - records.len(),
        "Normalized leaderboard"
    );
    records
}

/// Parse a single leaderboard entry
pub fn parse_contributor(entry: &Value) -> Result<ContributorRecord, Rejection> {
    let item = entry.as_object().ok_or(Rejection::NotAnObject)?;

    let username = USERNAME.resolve(item).ok_or(Rejection::MissingUsername)?;
    let wallet_rule = match item.get("wallets") {
        Some(Value::Object(_) | Value::Array(_)) => &WALLETS,
        _ => &WALLET,
    };
    let wallet_str = wallet_rule.resolve(item).ok_or(Rejection::MissingWallet)?;

    let total_xp = TOTAL_XP
        .resolve(item)
        .map(round_half_up)
        .filter(|xp| *xp >= 1.0)
        .ok_or(Rejection::NonPositiveXp)? as u64;

    let wallet: Pubkey = wallet_str
        .parse()
        .map_err(|_| Rejection::InvalidWallet(wallet_str.clone()))?;

    let mut categories = XpBreakdown {
        role: categories_from(ROLE_XP.resolve(item).as_ref()),
        domain: categories_from(DOMAIN_XP.resolve(item).as_ref()),
        skill: categories_from(SKILL_XP.resolve(item).as_ref()),
    };

    if categories.is_empty() {
        categories.role = legacy_scores(item);
    }
    if categories.is_empty() {
        debug!(
            username = %username,
            "No XP breakdown found, using default category"
        );
        categories.role.push(XpCategory::new(DEFAULT_CATEGORY, total_xp));
    }

    Ok(ContributorRecord {
        username,
        wallet,
        total_xp,
        categories,
    })
}

/// Interpret a `{ name: amount }` object; non-positive amounts are dropped
fn categories_from(value: Option<&Value>) -> Vec<XpCategory> {
    let Some(map) = value.and_then(Value::as_object) else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(name, amount)| {
            let amount = integer_amount(amount)?;
            (amount > 0).then(|| XpCategory::new(name.clone(), amount as u64))
        })
        .collect()
}

fn legacy_scores(item: &Map<String, Value>) -> Vec<XpCategory> {
    LEGACY_SCORES
        .iter()
        .filter_map(|(field, name)| {
            let score = item.get(*field).and_then(numeric)?;
            let amount = round_half_up(score);
            (amount >= 1.0).then(|| XpCategory::new(*name, amount as u64))
        })
        .collect()
}

/// A string with at least one non-whitespace character, passed through as-is
fn non_empty_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// A number or numeric string that is not zero
fn present_number(value: &Value) -> Option<f64> {
    numeric(value).filter(|n| *n != 0.0)
}

/// Anything other than null, false, 0 or ""
fn present_value(value: &Value) -> Option<Value> {
    let present = match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    };
    present.then(|| value.clone())
}

/// Numbers as-is; strings by their leading decimal number (`"12.5 pts"` is 12.5)
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s, true),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Category amounts truncate toward zero, strings by their leading integer
fn integer_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => leading_number(s, false).map(|f| f as i64),
        _ => None,
    }
}

fn leading_number(s: &str, allow_fraction: bool) -> Option<f64> {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if allow_fraction && !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    s[..end].trim_end_matches('.').parse().ok()
}

/// Half-way values round toward positive infinity
fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WALLET_A: &str = "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi";

    #[test]
    fn test_username_alias_priority() {
        let entry = json!({
            "github": "fallback",
            "username": "plain",
            "githubUsername": "camel",
            "wallet": WALLET_A,
            "xp": 10,
        });
        assert_eq!(parse_contributor(&entry).unwrap().username, "camel");

        let entry = json!({"github_username": "", "github": "gh", "wallet": WALLET_A, "xp": 10});
        assert_eq!(parse_contributor(&entry).unwrap().username, "gh");
    }

    #[test]
    fn test_username_is_kept_verbatim_but_blank_is_missing() {
        let entry = json!({"username": " alice ", "wallet": WALLET_A, "xp": 10});
        assert_eq!(parse_contributor(&entry).unwrap().username, " alice ");

        let entry = json!({"username": "   ", "github": "gh", "wallet": WALLET_A, "xp": 10});
        assert_eq!(parse_contributor(&entry).unwrap().username, "gh");

        let entry = json!({"username": " \t ", "wallet": WALLET_A, "xp": 10});
        assert_eq!(
            parse_contributor(&entry).unwrap_err(),
            Rejection::MissingUsername
        );
    }

    #[test]
    fn test_wallet_prefers_sol_then_first_string() {
        let entry = json!({
            "username": "a",
            "wallets": {"eth": "0xabc", "solana": WALLET_A},
            "score": 5,
        });
        assert_eq!(
            parse_contributor(&entry).unwrap().wallet.to_string(),
            WALLET_A
        );

        let entry = json!({
            "username": "a",
            "wallets": {"other": 42, "backup": WALLET_A},
            "score": 5,
        });
        assert_eq!(
            parse_contributor(&entry).unwrap().wallet.to_string(),
            WALLET_A
        );

        let entry = json!({"username": "a", "wallets": ["", WALLET_A], "score": 5});
        assert_eq!(
            parse_contributor(&entry).unwrap().wallet.to_string(),
            WALLET_A
        );
    }

    #[test]
    fn test_flat_wallet_keys_only_without_a_wallets_collection() {
        let entry = json!({
            "username": "a",
            "wallets": {"eth": 7},
            "wallet": WALLET_A,
            "score": 5,
        });
        assert_eq!(
            parse_contributor(&entry).unwrap_err(),
            Rejection::MissingWallet
        );

        let entry = json!({"username": "a", "wallets": "n/a", "wallet": WALLET_A, "score": 5});
        assert_eq!(
            parse_contributor(&entry).unwrap().wallet.to_string(),
            WALLET_A
        );

        let entry = json!({"username": "a", "wallets": null, "address": WALLET_A, "score": 5});
        assert_eq!(
            parse_contributor(&entry).unwrap().wallet.to_string(),
            WALLET_A
        );
    }

    #[test]
    fn test_xp_skips_zero_and_rounds() {
        let entry = json!({"username": "a", "wallet": WALLET_A, "score": 0, "points": "99.5"});
        assert_eq!(parse_contributor(&entry).unwrap().total_xp, 100);

        let entry = json!({"username": "a", "wallet": WALLET_A, "xp": 0.4});
        assert_eq!(
            parse_contributor(&entry).unwrap_err(),
            Rejection::NonPositiveXp
        );
    }

    #[test]
    fn test_category_amounts_truncate_and_drop_non_positive() {
        let entry = json!({
            "username": "a",
            "wallet": WALLET_A,
            "xp": 100,
            "skills": {"rust": 12.9, "go": "7", "cobol": 0, "perl": -3, "bad": "n/a"},
        });
        let record = parse_contributor(&entry).unwrap();
        assert_eq!(
            record.categories.skill,
            vec![XpCategory::new("rust", 12), XpCategory::new("go", 7)]
        );
        assert!(record.categories.role.is_empty());
    }

    #[test]
    fn test_legacy_scores_remap_into_role() {
        let entry = json!({
            "username": "a",
            "wallet": WALLET_A,
            "score": 1000,
            "prScore": 600.4,
            "issueScore": 0,
            "reviewScore": 399.6,
        });
        let record = parse_contributor(&entry).unwrap();
        assert_eq!(
            record.categories.role,
            vec![XpCategory::new("pr", 600), XpCategory::new("review", 400)]
        );
    }

    #[test]
    fn test_unrecognised_shapes_yield_nothing() {
        assert!(normalize(&json!({"data": []})).is_empty());
        assert!(normalize(&json!("leaderboard")).is_empty());
        assert!(normalize(&json!({"leaderboard": {"alice": 1}})).is_empty());
        assert!(normalize(&json!(null)).is_empty());
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number(" 12.5 pts", true), Some(12.5));
        assert_eq!(leading_number("12.5", false), Some(12.0));
        assert_eq!(leading_number("-4", true), Some(-4.0));
        assert_eq!(leading_number("7.", true), Some(7.0));
        assert_eq!(leading_number("abc", true), None);
        assert_eq!(leading_number("-", true), None);
    }
}
