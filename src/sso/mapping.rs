// ABOUTME: Attribute mapping from IdP assertions and claims to local profile fields
// ABOUTME: Configurable target-to-source table with value transforms, plus protocol defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! Attribute mapping for federated identities.
//!
//! Protocol defaults recognize the standard SAML URN attribute names and
//! their short forms, and the standard OIDC claims. A per-organization
//! [`AttributeMapping`] overrides or extends the defaults; transforms
//! normalize values on the way in. Multi-valued attributes take their
//! first value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Value transform applied when mapping a source claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Transform {
    /// Lowercase the string value
    Lowercase,
    /// Uppercase the string value
    Uppercase,
    /// Join all source values with a separator
    Concat {
        /// Separator placed between values
        separator: String,
    },
    /// Normalize to an RFC 3339 date string
    Date,
    /// Coerce to a boolean ("true"/"1"/"yes" are true)
    Boolean,
    /// Parse the string as embedded JSON
    Json,
}

/// One mapping rule: target profile field from one or more source claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRule {
    /// Profile field to populate
    pub target: String,
    /// Source claim names tried in order (all of them for `concat`)
    pub sources: Vec<String>,
    /// Optional transform applied to the resolved value
    pub transform: Option<Transform>,
}

/// Configurable mapping table applied after protocol defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Mapping rules, applied in order
    pub rules: Vec<AttributeRule>,
}

impl AttributeMapping {
    /// Apply the mapping table to raw source attributes
    ///
    /// Rules whose source claims are all absent are skipped.
    #[must_use]
    pub fn apply(&self, source: &HashMap<String, Value>) -> HashMap<String, Value> {
        let mut mapped = HashMap::new();

        for rule in &self.rules {
            let values: Vec<&Value> = rule
                .sources
                .iter()
                .filter_map(|name| source.get(name))
                .collect();

            if values.is_empty() {
                continue;
            }

            let value = match &rule.transform {
                Some(Transform::Concat { separator }) => {
                    let joined = values
                        .iter()
                        .map(|v| scalar_string(&first_value(v)))
                        .collect::<Vec<_>>()
                        .join(separator);
                    Value::String(joined)
                }
                transform => {
                    let value = first_value(values[0]);
                    apply_transform(value, transform.as_ref())
                }
            };

            mapped.insert(rule.target.clone(), value);
        }

        mapped
    }
}

/// Mapped profile handed to JIT provisioning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappedProfile {
    /// Primary email, required for provisioning
    pub email: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Given name
    pub given_name: Option<String>,
    /// Family name
    pub family_name: Option<String>,
    /// Avatar URL
    pub picture: Option<String>,
    /// Everything mapped, including custom fields
    pub attributes: HashMap<String, Value>,
}

impl MappedProfile {
    fn from_attributes(attributes: HashMap<String, Value>) -> Self {
        let get = |key: &str| {
            attributes
                .get(key)
                .map(|v| scalar_string(v))
                .filter(|s| !s.is_empty())
        };

        Self {
            email: get("email").map(|e| e.to_lowercase()),
            display_name: get("name"),
            given_name: get("given_name"),
            family_name: get("family_name"),
            picture: get("picture"),
            attributes,
        }
    }
}

/// Standard SAML attribute names (URN and short forms) per profile field
const SAML_DEFAULTS: &[(&str, &[&str])] = &[
    (
        "email",
        &[
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
            "urn:oid:0.9.2342.19200300.100.1.3",
            "email",
            "mail",
        ],
    ),
    (
        "name",
        &[
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name",
            "urn:oid:2.16.840.1.113730.3.1.241",
            "displayName",
            "name",
            "cn",
        ],
    ),
    (
        "given_name",
        &[
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname",
            "urn:oid:2.5.4.42",
            "givenName",
            "first_name",
        ],
    ),
    (
        "family_name",
        &[
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname",
            "urn:oid:2.5.4.4",
            "sn",
            "last_name",
        ],
    ),
];

/// Standard OIDC claim names per profile field
const OIDC_DEFAULTS: &[(&str, &[&str])] = &[
    ("email", &["email"]),
    ("name", &["name"]),
    ("given_name", &["given_name"]),
    ("family_name", &["family_name"]),
    ("picture", &["picture"]),
];

/// Map SAML assertion attributes to a profile, defaults first, then the
/// organization's custom mapping
#[must_use]
pub fn map_saml_attributes(
    attributes: &HashMap<String, Value>,
    custom: Option<&AttributeMapping>,
) -> MappedProfile {
    map_with_defaults(attributes, SAML_DEFAULTS, custom)
}

/// Map OIDC ID-token claims to a profile
#[must_use]
pub fn map_oidc_claims(
    claims: &HashMap<String, Value>,
    custom: Option<&AttributeMapping>,
) -> MappedProfile {
    map_with_defaults(claims, OIDC_DEFAULTS, custom)
}

fn map_with_defaults(
    source: &HashMap<String, Value>,
    defaults: &[(&str, &[&str])],
    custom: Option<&AttributeMapping>,
) -> MappedProfile {
    let mut mapped = HashMap::new();

    for (target, source_names) in defaults {
        for name in *source_names {
            if let Some(value) = source.get(*name) {
                let value = first_value(value);
                if !scalar_string(&value).is_empty() {
                    mapped.insert((*target).to_owned(), value);
                    break;
                }
            }
        }
    }

    if let Some(custom) = custom {
        mapped.extend(custom.apply(source));
    }

    MappedProfile::from_attributes(mapped)
}

/// Multi-valued attributes take their first value
fn first_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn apply_transform(value: Value, transform: Option<&Transform>) -> Value {
    match transform {
        None | Some(Transform::Concat { .. }) => value,
        Some(Transform::Lowercase) => Value::String(scalar_string(&value).to_lowercase()),
        Some(Transform::Uppercase) => Value::String(scalar_string(&value).to_uppercase()),
        Some(Transform::Date) => {
            let raw = scalar_string(&value);
            let normalized = chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.to_rfc3339())
                .or_else(|_| {
                    chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                        .map(|d| d.to_string())
                })
                .unwrap_or(raw);
            Value::String(normalized)
        }
        Some(Transform::Boolean) => {
            let truthy = matches!(
                scalar_string(&value).to_lowercase().as_str(),
                "true" | "1" | "yes"
            );
            Value::Bool(truthy)
        }
        Some(Transform::Json) => {
            let raw = scalar_string(&value);
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_standard_saml_attributes() {
        let source = attrs(&[
            (
                "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
                json!(["User@Example.com"]),
            ),
            (
                "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname",
                json!(["Ada"]),
            ),
        ]);

        let profile = map_saml_attributes(&source, None);
        assert_eq!(profile.email.as_deref(), Some("user@example.com"));
        assert_eq!(profile.given_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_short_saml_names() {
        let source = attrs(&[("mail", json!("ops@example.com")), ("cn", json!("Ops"))]);
        let profile = map_saml_attributes(&source, None);
        assert_eq!(profile.email.as_deref(), Some("ops@example.com"));
        assert_eq!(profile.display_name.as_deref(), Some("Ops"));
    }

    #[test]
    fn test_multi_valued_takes_first() {
        let source = attrs(&[("email", json!(["first@example.com", "second@example.com"]))]);
        let profile = map_saml_attributes(&source, None);
        assert_eq!(profile.email.as_deref(), Some("first@example.com"));
    }

    #[test]
    fn test_empty_list_skipped() {
        let source = attrs(&[("email", json!([]))]);
        let profile = map_saml_attributes(&source, None);
        assert!(profile.email.is_none());
    }

    #[test]
    fn test_custom_mapping_with_transforms() {
        let mapping = AttributeMapping {
            rules: vec![
                AttributeRule {
                    target: "department".into(),
                    sources: vec!["dept".into()],
                    transform: Some(Transform::Uppercase),
                },
                AttributeRule {
                    target: "name".into(),
                    sources: vec!["first".into(), "last".into()],
                    transform: Some(Transform::Concat {
                        separator: " ".into(),
                    }),
                },
                AttributeRule {
                    target: "is_contractor".into(),
                    sources: vec!["contractor".into()],
                    transform: Some(Transform::Boolean),
                },
            ],
        };

        let source = attrs(&[
            ("dept", json!("engineering")),
            ("first", json!("Ada")),
            ("last", json!("Lovelace")),
            ("contractor", json!("yes")),
            ("email", json!("ada@example.com")),
        ]);

        let profile = map_saml_attributes(&source, Some(&mapping));
        assert_eq!(
            profile.attributes.get("department"),
            Some(&json!("ENGINEERING"))
        );
        assert_eq!(profile.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(profile.attributes.get("is_contractor"), Some(&json!(true)));
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_unknown_sources_skipped() {
        let mapping = AttributeMapping {
            rules: vec![AttributeRule {
                target: "team".into(),
                sources: vec!["nonexistent".into()],
                transform: None,
            }],
        };

        let profile = map_oidc_claims(&HashMap::new(), Some(&mapping));
        assert!(profile.attributes.is_empty());
    }

    #[test]
    fn test_oidc_claims() {
        let claims = attrs(&[
            ("email", json!("User@Example.com")),
            ("name", json!("User Example")),
            ("picture", json!("https://cdn.example.com/u.png")),
        ]);

        let profile = map_oidc_claims(&claims, None);
        assert_eq!(profile.email.as_deref(), Some("user@example.com"));
        assert_eq!(profile.display_name.as_deref(), Some("User Example"));
        assert_eq!(
            profile.picture.as_deref(),
            Some("https://cdn.example.com/u.png")
        );
    }
}
