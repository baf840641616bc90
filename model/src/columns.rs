//! Per-vendor column mapping tables.
//!
//! Each extractor emits rows keyed by the column names its vendor page uses.
//! The normalizer consumes these tables to rename them onto canonical
//! [`Advisory`](crate::Advisory) attributes; vendor columns with no mapping
//! are dropped.

use crate::Vendor;

pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const IDENTIFIER: &str = "identifier";
pub const SEVERITY: &str = "severity";
pub const CVSS_SCORE: &str = "cvss_score";
pub const PUBLISHED: &str = "published";
pub const LAST_UPDATED: &str = "last_updated";
pub const URL: &str = "url";
pub const AFFECTED_VERSIONS: &str = "affected_versions";
pub const UNAFFECTED_VERSIONS: &str = "unaffected_versions";
pub const PRODUCT_NAME: &str = "product_name";
pub const PRODUCT_VERSION: &str = "product_version";

const CISCO: &[(&str, &str)] = &[
    ("Advisory", TITLE),
    ("Impact", DESCRIPTION),
    ("CVE", IDENTIFIER),
    ("Last Updated", LAST_UPDATED),
    ("Version", PRODUCT_VERSION),
    ("URL", URL),
    ("Severity", SEVERITY),
    ("CVSS Score", CVSS_SCORE),
];

const INTEL: &[(&str, &str)] = &[
    ("Title", TITLE),
    ("Advisory Number", IDENTIFIER),
    ("Updated", LAST_UPDATED),
    ("Release Date", PUBLISHED),
    ("URL", URL),
    ("Severity", SEVERITY),
    ("CVSS Score", CVSS_SCORE),
];

// NVIDIA bulletins carry both a bulletin id and a CVE list. The bulletin id
// is the stable per-advisory key, so it becomes the identifier; the CVE list
// goes into the description where the severity safety net can still see it.
const NVIDIA: &[(&str, &str)] = &[
    ("Title", TITLE),
    ("Bulletin ID", IDENTIFIER),
    ("Severity", SEVERITY),
    ("CVE Identifier(s)", DESCRIPTION),
    ("Publish Date", PUBLISHED),
    ("Last Updated", LAST_UPDATED),
    ("URL", URL),
];

const DELL: &[(&str, &str)] = &[
    ("Title", TITLE),
    ("Impact", DESCRIPTION),
    ("Identifier", IDENTIFIER),
    ("Published", PUBLISHED),
    ("Updated", LAST_UPDATED),
    ("URL", URL),
    ("Severity", SEVERITY),
    ("CVSS Score", CVSS_SCORE),
];

const ADOBE: &[(&str, &str)] = &[
    ("Title", TITLE),
    ("Posted", PUBLISHED),
    ("Updated", LAST_UPDATED),
    ("Section", PRODUCT_NAME),
    ("URL", URL),
    ("Severity", SEVERITY),
];

const PALO_ALTO: &[(&str, &str)] = &[
    ("Summary", TITLE),
    ("Identifier", IDENTIFIER),
    ("CVSS", CVSS_SCORE),
    ("Severity", SEVERITY),
    ("Product", PRODUCT_NAME),
    ("Versions", PRODUCT_VERSION),
    ("Affected", AFFECTED_VERSIONS),
    ("Unaffected", UNAFFECTED_VERSIONS),
    ("Published", PUBLISHED),
    ("Updated", LAST_UPDATED),
    ("URL", URL),
];

pub fn column_map(vendor: Vendor) -> &'static [(&'static str, &'static str)] {
    match vendor {
        Vendor::Cisco => CISCO,
        Vendor::Intel => INTEL,
        Vendor::Nvidia => NVIDIA,
        Vendor::Dell => DELL,
        Vendor::Adobe => ADOBE,
        Vendor::PaloAlto => PALO_ALTO,
    }
}

/// Canonical column for a vendor column name, if it maps to one.
pub fn canonical(vendor: Vendor, column: &str) -> Option<&'static str> {
    column_map(vendor)
        .iter()
        .find(|(vendor_column, _)| *vendor_column == column)
        .map(|(_, canonical)| *canonical)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_columns_do_not_map() {
        assert_eq!(canonical(Vendor::Dell, "Type"), None);
        assert_eq!(canonical(Vendor::Cisco, "Advisory"), Some(TITLE));
    }

    #[test]
    fn every_vendor_maps_a_title() {
        for vendor in Vendor::ALL {
            assert!(
                column_map(vendor).iter().any(|(_, canonical)| *canonical == TITLE),
                "{vendor} has no title mapping"
            );
        }
    }
}
