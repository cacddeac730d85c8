use crate::core::model::Profile;
use crate::profile::rules::{default_rules, RuleGroup};

/// Turns the cleaned lines of one card into a `Profile`.
///
/// Position carries meaning: line 0 is the serial number and line 1 the EPIC
/// number. Every other field comes from the rule groups, which all see every line.
#[derive(Debug, Clone)]
pub struct ProfileParser {
    groups: Vec<RuleGroup>,
}

impl Default for ProfileParser {
    fn default() -> Self {
        Self {
            groups: default_rules(),
        }
    }
}

impl ProfileParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, lines: &[String]) -> Profile {
        let mut profile = Profile::default();
        for group in &self.groups {
            group.run(lines, &mut profile);
        }
        profile.sl_no = lines.first().cloned();
        profile.epic_no = lines.get(1).cloned();
        profile
    }
}
