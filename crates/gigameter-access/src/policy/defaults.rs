//! Built-in category set used when the store is empty or unreachable.

use indexmap::IndexMap;

use crate::policy::category::{CategoryPolicy, DocVisibility, FieldRules, ResponseFilters};

/// Name of the built-in default category.
pub const DEFAULT_CATEGORY: &str = "public";

const PUBLIC_DESCRIPTION: &str = "API to query list schools and countries with GIGA Meter \
installed and their raw measurements indicators like download speed, latency, upload speed etc.\n\n\
<b>License</b>: The dataset accessed through this API is made available under the \
<a target=\"_blank\" href=\"https://opendatacommons.org/licenses/odbl/1-0/\">Open Data Commons \
Open Database License (ODbL)</a>. You are free to copy, distribute, transmit and adapt our data, \
as long as you credit Giga and its contributors. If you alter or build upon our data, you may \
distribute the result only under the same license. The full legal code explains your rights \
and responsibilities.";

/// The built-in policies in publication order: `public` (default), `gov`, `admin`.
#[must_use]
pub fn builtin_policies() -> Vec<CategoryPolicy> {
    vec![public(), gov(), admin()]
}

fn public() -> CategoryPolicy {
    let mut endpoints = IndexMap::new();
    endpoints.insert(
        "/api/v1/dailycheckapp_schools".to_string(),
        FieldRules {
            include: Vec::new(),
            exclude: vec!["giga_id_school".to_string()],
        },
    );

    CategoryPolicy::new(DEFAULT_CATEGORY)
        .as_default()
        .allow("/api/v1/dailycheckapp_schools", ["GET"])
        .allow("/api/v1/dailycheckapp_countries", ["GET"])
        .allow("/api/v1/measurements", ["GET"])
        .with_filters(ResponseFilters {
            include: Vec::new(),
            exclude: strings(&["BrowserID", "IP", "deviceId", "ServerInfo"]),
            endpoints,
        })
        .with_docs(DocVisibility {
            visible: true,
            title: Some("Daily Check App API".to_string()),
            description: Some(PUBLIC_DESCRIPTION.to_string()),
        })
}

fn gov() -> CategoryPolicy {
    let mut endpoints = IndexMap::new();
    endpoints.insert(
        "/api/v1/measurements".to_string(),
        FieldRules {
            include: Vec::new(),
            exclude: strings(&["IP", "BrowserID", "deviceId"]),
        },
    );

    CategoryPolicy::new("gov")
        .deny("/api/v1/measurements*", ["GET"])
        .deny("/api/v1/schools/features_flags/{giga_id_school}", ["PUT"])
        .deny("/api/v1/dailycheckapp_schools*", ["GET"])
        .deny("/api/v1/dailycheckapp_countries*", ["DELETE", "GET"])
        .deny("/api/v1/flagged_dailycheckapp_schools*", ["POST", "GET"])
        .with_filters(ResponseFilters {
            include: Vec::new(),
            exclude: strings(&["IP", "BrowserID", "ServerInfo"]),
            endpoints,
        })
        .with_docs(DocVisibility {
            visible: true,
            title: Some("Daily Check App Government API".to_string()),
            description: Some("Government access API endpoints for GIGA Meter data".to_string()),
        })
}

fn admin() -> CategoryPolicy {
    CategoryPolicy::new("admin").with_docs(DocVisibility {
        visible: true,
        title: Some("GIGA Meter Admin API".to_string()),
        description: Some("Complete API documentation with admin access".to_string()),
    })
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}
