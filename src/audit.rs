// src/audit.rs

//! CPE-based vulnerability lookup against an external CVE feed
//!
//! Each installed package carrying a CPE identifier is checked against a
//! configured HTTP endpoint serving JSON documents keyed by CPE. The
//! document is an array of objects with `cveId` and `description` fields.
//! With `depends_on`, reverse-dependency chains reaching a vulnerable
//! package are listed as well.

use serde::Deserialize;
use tracing::debug;

use crate::db::models::PackageRow;
use crate::error::{Error, Result};
use crate::instance::Mport;

#[derive(Debug, Clone, Deserialize)]
struct CveRecord {
    #[serde(rename = "cveId")]
    cve_id: Option<String>,
    description: Option<String>,
}

/// Vulnerability findings for one package
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub pkg: String,
    pub version: String,
    pub entries: Vec<(String, Option<String>)>,
}

impl AuditReport {
    /// Render the report the way the CLI prints it.
    pub fn render(&self) -> String {
        let mut out = format!("{}-{} is vulnerable:\n", self.pkg, self.version);
        for (id, description) in &self.entries {
            out.push_str(id);
            out.push('\n');
            if let Some(desc) = description {
                out.push_str(&format!("Description: {desc}\n"));
            }
        }
        out
    }
}

/// Audit one installed package. Packages without a CPE are skipped
/// (`Ok(None)`), as are packages with no published CVEs.
pub fn audit_package(mport: &Mport, name: &str) -> Result<Option<AuditReport>> {
    let pkg = PackageRow::find_by_name(&mport.db, name)?
        .ok_or_else(|| Error::Warn(format!("{name} is not installed")))?;

    let Some(cpe) = pkg.cpe.as_deref().filter(|c| !c.is_empty()) else {
        debug!("{name} has no CPE, skipping audit");
        return Ok(None);
    };

    let url = format!("{}/{cpe}", mport.settings.cve_url.trim_end_matches('/'));
    let body = mport.fetcher.get(&url, mport.settings.fetch_timeout)?;

    let records: Vec<CveRecord> = serde_json::from_slice(&body)
        .map_err(|e| Error::Fatal(format!("Failed to parse CVE document: {e}")))?;

    let entries: Vec<(String, Option<String>)> = records
        .into_iter()
        .filter_map(|r| r.cve_id.map(|id| (id, r.description)))
        .collect();

    if entries.is_empty() {
        return Ok(None);
    }

    Ok(Some(AuditReport {
        pkg: pkg.name,
        version: pkg.version,
        entries,
    }))
}

/// Audit the whole installed set (or one package), optionally listing the
/// reverse-dependency chains that reach each vulnerable package.
pub fn audit(mport: &Mport, name: Option<&str>, depends_on: bool) -> Result<Vec<AuditReport>> {
    let targets: Vec<String> = match name {
        Some(n) => vec![n.to_string()],
        None => PackageRow::list_all(&mport.db)?
            .into_iter()
            .map(|p| p.name)
            .collect(),
    };

    let mut reports = Vec::new();
    for target in &targets {
        if let Some(report) = audit_package(mport, target)? {
            mport.msg(&report.render());

            if depends_on {
                for chain in dependency_chains(mport, target)? {
                    mport.msg(&format!("  required by: {}", chain.join(" <- ")));
                }
            }

            reports.push(report);
        }
    }

    Ok(reports)
}

/// Reverse-dependency chains from a package up to its roots.
fn dependency_chains(mport: &Mport, name: &str) -> Result<Vec<Vec<String>>> {
    let mut chains = Vec::new();
    let mut stack = vec![vec![name.to_string()]];

    while let Some(chain) = stack.pop() {
        let tip = chain.last().expect("chains are never empty");
        let parents = PackageRow::up_depends(&mport.db, tip)?;

        if parents.is_empty() {
            if chain.len() > 1 {
                chains.push(chain);
            }
            continue;
        }

        for parent in parents {
            if chain.contains(&parent.name) {
                // cycle guard; cycles are a data error elsewhere
                continue;
            }
            let mut extended = chain.clone();
            extended.push(parent.name);
            stack.push(extended);
        }
    }

    chains.sort();
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DependsRow;
    use crate::fetch::StaticFetcher;
    use crate::testutil::test_instance;

    fn installed_with_cpe(mport: &Mport, name: &str, cpe: Option<&str>) {
        let mut pkg = PackageRow::new(name, "1.0", &format!("misc/{name}"), "/usr/local");
        pkg.install_date = crate::testutil::TEST_NOW;
        pkg.cpe = cpe.map(|c| c.to_string());
        pkg.insert(&mport.db).unwrap();
    }

    #[test]
    fn test_no_cpe_skips() {
        let dir = tempfile::tempdir().unwrap();
        let mport = test_instance(dir.path());
        installed_with_cpe(&mport, "plain", None);

        assert!(audit_package(&mport, "plain").unwrap().is_none());
    }

    #[test]
    fn test_audit_reports_cves() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());
        installed_with_cpe(
            &mport,
            "curl",
            Some("cpe:2.3:a:haxx:curl:8.0.0:*:*:*:*:*:*:*"),
        );

        let body = serde_json::json!([
            {"cveId": "CVE-2024-0001", "description": "Heap overflow in parser"},
            {"cveId": "CVE-2024-0002"}
        ]);
        mport.fetcher = Box::new(
            StaticFetcher::new().route("curl:8.0.0:*:*:*:*:*:*:*", body.to_string().into_bytes()),
        );

        let report = audit_package(&mport, "curl").unwrap().unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].0, "CVE-2024-0001");

        let rendered = report.render();
        assert!(rendered.starts_with("curl-1.0 is vulnerable:"));
        assert!(rendered.contains("Description: Heap overflow in parser"));
    }

    #[test]
    fn test_audit_empty_feed_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());
        installed_with_cpe(&mport, "safe", Some("cpe:2.3:a:x:safe:1:*:*:*:*:*:*:*"));

        mport.fetcher = Box::new(StaticFetcher::new().route("*", b"[]".to_vec()));
        assert!(audit_package(&mport, "safe").unwrap().is_none());
    }

    #[test]
    fn test_dependency_chains() {
        let dir = tempfile::tempdir().unwrap();
        let mport = test_instance(dir.path());
        installed_with_cpe(&mport, "openssl", None);
        installed_with_cpe(&mport, "curl", None);
        installed_with_cpe(&mport, "git", None);

        for (pkg, dep) in [("curl", "openssl"), ("git", "curl")] {
            DependsRow {
                pkg: pkg.to_string(),
                depend_pkgname: dep.to_string(),
                depend_pkgversion: None,
                depend_port: None,
            }
            .insert(&mport.db)
            .unwrap();
        }

        let chains = dependency_chains(&mport, "openssl").unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0], vec!["openssl", "curl", "git"]);
    }
}
