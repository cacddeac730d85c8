use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::core::model::{Gender, Profile, RelationType};

static AGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)AGE.+").unwrap());
static GENDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)GENDER.*?(FEMALE|MALE)").unwrap());
static LEADING_NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\W+").unwrap());
static HOUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)HOUSE\s*[^a-zA-Z0-9]*NUMBER\s*[^a-zA-Z0-9]*([\w\s-]*)").unwrap()
});
static EDGE_NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\W+|\W+$").unwrap());
static FATHER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)FATHER'?S?\W*NAME\W*(.*)").unwrap());
static HUSBAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)HUSBAND'?S?\W*NAME\W*(.*)").unwrap());
static OTHERS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)OTHERS\W*(.*)").unwrap());
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)NAME\W*(.*)").unwrap());

/// A single field assignment produced by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Age(u32),
    Gender(Gender),
    Address(String),
    Name(String),
    Relative {
        name: String,
        relation: RelationType,
    },
}

impl FieldUpdate {
    pub fn apply(self, profile: &mut Profile) {
        match self {
            FieldUpdate::Age(age) => profile.age = Some(age),
            FieldUpdate::Gender(gender) => profile.gender = Some(gender),
            FieldUpdate::Address(address) => profile.address = non_empty(address),
            FieldUpdate::Name(name) => profile.name = non_empty(name),
            FieldUpdate::Relative { name, relation } => {
                profile.relative_name = non_empty(name);
                profile.relation_type = Some(relation);
            }
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub label: &'static str,
    pub extract: fn(&str) -> Option<FieldUpdate>,
    /// A match ends the scan of the whole group.
    pub stops_scan: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Every rule is tried on every line.
    EveryRule,
    /// The first rule that matches a line claims it.
    FirstRule,
}

#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub label: &'static str,
    pub mode: ScanMode,
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    /// Applies the group top to bottom; later matches overwrite earlier ones.
    pub fn run(&self, lines: &[String], profile: &mut Profile) {
        'lines: for line in lines {
            for rule in &self.rules {
                let Some(update) = (rule.extract)(line) else {
                    continue;
                };
                debug!(group = self.label, rule = rule.label, line = %line, "rule matched");
                update.apply(profile);
                if rule.stops_scan {
                    break 'lines;
                }
                if self.mode == ScanMode::FirstRule {
                    continue 'lines;
                }
            }
        }
    }
}

pub fn extract_age(line: &str) -> Option<FieldUpdate> {
    if !AGE_RE.is_match(line) {
        return None;
    }
    // every digit on the line, so "AGE : 3 5" reads as 35
    let digits: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().map(FieldUpdate::Age)
}

pub fn extract_gender(line: &str) -> Option<FieldUpdate> {
    let caps = GENDER_RE.captures(line)?;
    let gender = if caps[1].eq_ignore_ascii_case("MALE") {
        Gender::M
    } else {
        Gender::F
    };
    Some(FieldUpdate::Gender(gender))
}

pub fn extract_address(line: &str) -> Option<FieldUpdate> {
    let line = LEADING_NON_WORD_RE.replace(line, "");
    let caps = HOUSE_RE.captures(&line)?;
    let address = EDGE_NON_WORD_RE.replace_all(&caps[1], "");
    Some(FieldUpdate::Address(address.into_owned()))
}

fn relative(re: &Regex, line: &str, relation: RelationType) -> Option<FieldUpdate> {
    let caps = re.captures(line)?;
    Some(FieldUpdate::Relative {
        name: caps[1].trim().to_string(),
        relation,
    })
}

pub fn extract_father(line: &str) -> Option<FieldUpdate> {
    relative(&FATHER_RE, line, RelationType::Fthr)
}

pub fn extract_husband(line: &str) -> Option<FieldUpdate> {
    relative(&HUSBAND_RE, line, RelationType::Hsbn)
}

pub fn extract_other_relative(line: &str) -> Option<FieldUpdate> {
    relative(&OTHERS_RE, line, RelationType::Othr)
}

pub fn extract_name(line: &str) -> Option<FieldUpdate> {
    let caps = NAME_RE.captures(line)?;
    Some(FieldUpdate::Name(caps[1].trim().to_string()))
}

/// The card template's rules. Relative patterns outrank the plain NAME pattern
/// and end the name scan; a plain NAME seen on an earlier line is kept.
pub fn default_rules() -> Vec<RuleGroup> {
    vec![
        RuleGroup {
            label: "age",
            mode: ScanMode::EveryRule,
            rules: vec![Rule {
                label: "age",
                extract: extract_age,
                stops_scan: false,
            }],
        },
        RuleGroup {
            label: "gender",
            mode: ScanMode::EveryRule,
            rules: vec![Rule {
                label: "gender",
                extract: extract_gender,
                stops_scan: false,
            }],
        },
        RuleGroup {
            label: "address",
            mode: ScanMode::EveryRule,
            rules: vec![Rule {
                label: "house-number",
                extract: extract_address,
                stops_scan: false,
            }],
        },
        RuleGroup {
            label: "names",
            mode: ScanMode::FirstRule,
            rules: vec![
                Rule {
                    label: "father",
                    extract: extract_father,
                    stops_scan: true,
                },
                Rule {
                    label: "husband",
                    extract: extract_husband,
                    stops_scan: true,
                },
                Rule {
                    label: "others",
                    extract: extract_other_relative,
                    stops_scan: true,
                },
                Rule {
                    label: "name",
                    extract: extract_name,
                    stops_scan: false,
                },
            ],
        },
    ]
}
