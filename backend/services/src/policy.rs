use std::collections::HashSet;

use portauthority_shared::{Feature, Violation};

use crate::entity::policies;
use crate::error::ServiceError;

/// Evaluates an image's features against a policy, producing violations in
/// feature order, then vulnerability order within each feature.
///
/// Per feature the checks apply in fixed precedence:
/// 1. blacklisted OS (skips the feature's remaining vulnerabilities)
/// 2. blacklisted CVE
/// 3. whitelisted CVE
/// 4. allowed severity
/// 5. unfixed tolerated
/// anything left over is a basic violation.
pub fn get_violations(
    policy: &policies::Model,
    features: &[Feature],
) -> Result<Vec<Violation>, ServiceError> {
    let not_allowed_os = string_set(&policy.not_allowed_os_names)?;
    let not_allowed_cves = string_set(&policy.not_allowed_cve_names)?;
    let allowed_cves = string_set(&policy.allowed_cve_names)?;
    let allowed_severities = string_set(&policy.allowed_risk_severity)?;

    let mut violations = Vec::new();

    'features: for feature in features {
        if not_allowed_os.contains(&feature.namespace_name) {
            violations.push(Violation::BlacklistedOs);
            continue 'features;
        }

        for vulnerability in &feature.vulnerabilities {
            if not_allowed_cves.contains(&vulnerability.name) {
                violations.push(Violation::BlacklistedCve {
                    feature_name: feature.name.clone(),
                    feature_version: feature.version.clone(),
                    vulnerability: vulnerability.clone(),
                });
                continue;
            }

            if allowed_cves.contains(&vulnerability.name) {
                continue;
            }

            if allowed_severities.contains(&vulnerability.severity) {
                continue;
            }

            if policy.allow_not_fixed && vulnerability.fixed_by.is_empty() {
                continue;
            }

            violations.push(Violation::Basic {
                feature_name: feature.name.clone(),
                feature_version: feature.version.clone(),
                vulnerability: vulnerability.clone(),
            });
        }
    }

    Ok(violations)
}

/// Policy lists are stored as JSON arrays of strings; anything else is a
/// policy schema error.
fn string_set(value: &serde_json::Value) -> Result<HashSet<String>, ServiceError> {
    let list: Vec<String> = serde_json::from_value(value.clone())
        .map_err(|err| ServiceError::BadRequest(format!("malformed policy list: {err}")))?;
    Ok(list.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portauthority_shared::Vulnerability;
    use serde_json::json;

    fn policy(
        severities: &[&str],
        allowed_cves: &[&str],
        not_allowed_cves: &[&str],
        not_allowed_os: &[&str],
        allow_not_fixed: bool,
    ) -> policies::Model {
        let now = Utc::now().fixed_offset();
        policies::Model {
            id: 1,
            name: "default".into(),
            allowed_risk_severity: json!(severities),
            allowed_cve_names: json!(allowed_cves),
            allow_not_fixed,
            not_allowed_cve_names: json!(not_allowed_cves),
            not_allowed_os_names: json!(not_allowed_os),
            created: now,
            updated: now,
        }
    }

    fn vuln(name: &str, severity: &str, fixed_by: &str) -> Vulnerability {
        Vulnerability {
            name: name.into(),
            severity: severity.into(),
            fixed_by: fixed_by.into(),
            ..Default::default()
        }
    }

    fn feature(namespace: &str, name: &str, vulns: Vec<Vulnerability>) -> Feature {
        Feature {
            name: name.into(),
            namespace_name: namespace.into(),
            version: "1.0".into(),
            vulnerabilities: vulns,
            ..Default::default()
        }
    }

    #[test]
    fn clean_feature_produces_no_violations() {
        let policy = policy(&[], &[], &[], &[], true);
        let features = vec![feature("debian:11", "openssl", vec![])];
        assert!(get_violations(&policy, &features).unwrap().is_empty());
    }

    #[test]
    fn blacklisted_os_skips_remaining_vulns() {
        let policy = policy(&[], &[], &[], &["debian:9"], false);
        let features = vec![feature(
            "debian:9",
            "openssl",
            vec![vuln("CVE-1", "High", "1.1")],
        )];

        let violations = get_violations(&policy, &features).unwrap();
        assert_eq!(violations, vec![Violation::BlacklistedOs]);
    }

    #[test]
    fn blacklist_takes_precedence_over_allowed_severity() {
        let policy = policy(&["High"], &[], &["CVE-1"], &[], false);
        let features = vec![feature(
            "debian:11",
            "openssl",
            vec![vuln("CVE-1", "High", "1.1")],
        )];

        let violations = get_violations(&policy, &features).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], Violation::BlacklistedCve { .. }));
    }

    #[test]
    fn whitelisted_cve_is_skipped() {
        let policy = policy(&[], &["CVE-1"], &[], &[], false);
        let features = vec![feature(
            "debian:11",
            "openssl",
            vec![vuln("CVE-1", "Critical", "")],
        )];
        assert!(get_violations(&policy, &features).unwrap().is_empty());
    }

    #[test]
    fn allowed_severity_is_skipped() {
        let policy = policy(&["Low", "Negligible"], &[], &[], &[], false);
        let features = vec![feature(
            "debian:11",
            "openssl",
            vec![vuln("CVE-1", "Low", "")],
        )];
        assert!(get_violations(&policy, &features).unwrap().is_empty());
    }

    #[test]
    fn unfixed_vuln_tolerated_only_when_allowed() {
        let features = vec![feature(
            "debian:11",
            "openssl",
            vec![vuln("CVE-1", "High", "")],
        )];

        let tolerant = policy(&[], &[], &[], &[], true);
        assert!(get_violations(&tolerant, &features).unwrap().is_empty());

        let strict = policy(&[], &[], &[], &[], false);
        let violations = get_violations(&strict, &features).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], Violation::Basic { .. }));
    }

    #[test]
    fn violations_preserve_feature_then_vuln_order() {
        let policy = policy(&[], &[], &["CVE-2"], &[], false);
        let features = vec![
            feature(
                "debian:11",
                "openssl",
                vec![vuln("CVE-1", "High", "1.1"), vuln("CVE-2", "Low", "")],
            ),
            feature("debian:11", "zlib", vec![vuln("CVE-3", "Medium", "2.0")]),
        ];

        let violations = get_violations(&policy, &features).unwrap();
        assert_eq!(violations.len(), 3);
        assert!(
            matches!(&violations[0], Violation::Basic { vulnerability, .. } if vulnerability.name == "CVE-1")
        );
        assert!(
            matches!(&violations[1], Violation::BlacklistedCve { vulnerability, .. } if vulnerability.name == "CVE-2")
        );
        assert!(
            matches!(&violations[2], Violation::Basic { feature_name, .. } if feature_name == "zlib")
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let policy = policy(&["Low"], &["CVE-9"], &["CVE-2"], &["alpine:3.8"], true);
        let features = vec![
            feature("alpine:3.8", "musl", vec![vuln("CVE-1", "High", "1.1")]),
            feature(
                "debian:11",
                "openssl",
                vec![
                    vuln("CVE-2", "Low", ""),
                    vuln("CVE-9", "Critical", ""),
                    vuln("CVE-4", "High", ""),
                ],
            ),
        ];

        let first = get_violations(&policy, &features).unwrap();
        let second = get_violations(&policy, &features).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_policy_list_is_a_bad_request() {
        let mut bad = policy(&[], &[], &[], &[], false);
        bad.not_allowed_os_names = json!({"not": "a list"});
        let err = get_violations(&bad, &[]).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }
}
