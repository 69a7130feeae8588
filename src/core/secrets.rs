/// Secret classification and masking
///
/// Environment variable keys are classified by a case-insensitive substring
/// heuristic. Matched values are replaced with a stable placeholder before
/// any artifact is rendered, and the key names are collected into a separate
/// template so an operator can refill them during restore. The heuristic may
/// over- or under-mask; that is a documented limitation, not an error.

use serde::{Deserialize, Serialize};

use crate::core::inspector::ContainerRecord;
use crate::utils::{MASK_PLACEHOLDER, SECRET_KEYWORDS};

/// Masking policy. The keyword list is an input rather than a hard-coded
/// constant so deployments can extend it.
#[derive(Debug, Clone)]
pub struct MaskPolicy {
    pub enabled: bool,
    pub keywords: Vec<String>,
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: SECRET_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl MaskPolicy {
    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Case-insensitive substring match against the keyword list.
    pub fn is_secret_key(&self, key: &str) -> bool {
        let upper = key.to_uppercase();
        self.keywords.iter().any(|w| upper.contains(&w.to_uppercase()))
    }
}

/// One masked key, remembered so the operator can refill it on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretSlot {
    pub container: String,
    pub key: String,
}

/// Key names (never values) of everything that was masked in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsTemplate {
    pub slots: Vec<SecretSlot>,
}

impl SecretsTemplate {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Render as an env-style file, grouped by container.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "# Secrets template generated by Config Guardian\n\
             # Keys below were masked in every artifact. Fill in values before restore.\n",
        );

        let mut current = "";
        for slot in &self.slots {
            if slot.container != current {
                out.push_str(&format!("\n# {}\n", slot.container));
                current = &slot.container;
            }
            out.push_str(&format!("{}=\n", slot.key));
        }

        out
    }
}

/// Mask secret-classified env values in place.
///
/// Guarantees when the policy is enabled: no matched, non-empty value
/// survives in any record; unmatched keys pass through unchanged; empty
/// values are never treated as secrets. When disabled, records are returned
/// untouched and the template is empty.
pub fn mask_records(policy: &MaskPolicy, records: &mut [ContainerRecord]) -> SecretsTemplate {
    let mut template = SecretsTemplate::default();

    if !policy.enabled {
        return template;
    }

    for record in records.iter_mut() {
        for (key, value) in record.env.iter_mut() {
            if value.is_empty() || !policy.is_secret_key(key) {
                continue;
            }
            *value = MASK_PLACEHOLDER.to_string();
            template.slots.push(SecretSlot {
                container: record.name.clone(),
                key: key.clone(),
            });
        }
    }

    template
}
