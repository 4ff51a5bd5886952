//! Effective enrollment attributes.
//!
//! Layers, lowest to highest precedence:
//! 1. the issuer's default template
//! 2. annotations of the Ingress owning the parent Certificate
//! 3. annotations of the parent Certificate
//! 4. the issuer's override template
//!
//! Labels merge per key. Empty values never replace a lower layer.

use crds::annotations::{CONTACT_EMAIL, LABELS_PREFIX, OWNER, TEAM};
use crds::{AttributeTemplate, IssuerSpec};
use pki_client::EnrollRequest;
use std::collections::BTreeMap;

/// Attributes attached to an enrollment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveAttributes {
    /// Certificate owner
    pub owner: Option<String>,
    /// Owning team
    pub team: Option<String>,
    /// Contact email
    pub contact_email: Option<String>,
    /// Labels
    pub labels: BTreeMap<String, String>,
}

fn overlay(field: &mut Option<String>, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *field = Some(value.to_string());
    }
}

impl EffectiveAttributes {
    fn apply_template(&mut self, template: Option<&AttributeTemplate>) {
        let Some(template) = template else {
            return;
        };
        overlay(&mut self.owner, template.owner.as_deref());
        overlay(&mut self.team, template.team.as_deref());
        overlay(&mut self.contact_email, template.contact_email.as_deref());
        self.apply_labels(template.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    fn apply_annotations(&mut self, annotations: Option<&BTreeMap<String, String>>) {
        let Some(annotations) = annotations else {
            return;
        };
        overlay(&mut self.owner, annotations.get(OWNER).map(String::as_str));
        overlay(&mut self.team, annotations.get(TEAM).map(String::as_str));
        overlay(
            &mut self.contact_email,
            annotations.get(CONTACT_EMAIL).map(String::as_str),
        );
        self.apply_labels(annotations.iter().filter_map(|(key, value)| {
            key.strip_prefix(LABELS_PREFIX)
                .map(|label| (label, value.as_str()))
        }));
    }

    fn apply_labels<'a>(&mut self, labels: impl Iterator<Item = (&'a str, &'a str)>) {
        for (label, value) in labels {
            if !label.is_empty() && !value.is_empty() {
                self.labels.insert(label.to_string(), value.to_string());
            }
        }
    }

    /// Enrollment request carrying these attributes
    pub fn into_enroll_request(self, profile: &str, csr: String) -> EnrollRequest {
        EnrollRequest {
            profile: profile.to_string(),
            csr,
            labels: self.labels,
            owner: self.owner,
            team: self.team,
            contact_email: self.contact_email,
        }
    }
}

/// Resolve the attributes of one enrollment
pub fn resolve(
    issuer: &IssuerSpec,
    ingress_annotations: Option<&BTreeMap<String, String>>,
    certificate_annotations: Option<&BTreeMap<String, String>>,
) -> EffectiveAttributes {
    let mut attributes = EffectiveAttributes::default();
    attributes.apply_template(issuer.default_template.as_ref());
    attributes.apply_annotations(ingress_annotations);
    attributes.apply_annotations(certificate_annotations);
    attributes.apply_template(issuer.override_template.as_ref());
    attributes
}
