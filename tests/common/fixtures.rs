//! Synthetic inventory snapshots

use serde_json::{Value, json};

const SOURCE_TYPE: &str = "clr_onyxservicecodes";
const FO_TYPES: [&str; 4] = [
    "clr_service_catalog_fo_e",
    "clr_service_catalog_fo_n",
    "clr_service_catalog_fo_p",
    "clr_service_catalog_fo_cloud",
];

/// Shape of a generated snapshot
#[derive(Clone, Copy, Debug)]
pub struct SnapshotShape {
    /// Numeric NIT mismatches (`r{i}`)
    pub normal: usize,
    /// How many of the normal ones sit under a forward object (`k{i}`)
    pub eligible: usize,
    /// Mismatches involving a NIT with letters (`p{i}`)
    pub particular: usize,
    /// Relationships whose NITs agree (`ok{i}`)
    pub consistent: usize,
}

impl SnapshotShape {
    /// Build the snapshot document
    ///
    /// Usage relationships come first; containment relationships close the
    /// `relations` array in `k0..k{eligible}` order.
    pub fn build(&self) -> Value {
        let mut cis = Vec::new();
        let mut relations = Vec::new();
        let mut containments = Vec::new();

        for i in 0..self.normal {
            cis.push(ci(&format!("s{i}"), SOURCE_TYPE, Some(("clr_onyxdb_company_nit", format!("900{i:04}")))));
            cis.push(ci(&format!("c{i}"), "clr_onyxdb", Some(("clr_onyxdb_companynit", format!("800{i:04}")))));
            relations.push(rel(&format!("r{i}"), "usage", &format!("s{i}"), &format!("c{i}")));

            if i < self.eligible {
                cis.push(ci(&format!("fo{i}"), FO_TYPES[i % FO_TYPES.len()], None));
                containments.push(rel(
                    &format!("k{i}"),
                    "containment",
                    &format!("fo{i}"),
                    &format!("c{i}"),
                ));
            }
        }

        for i in 0..self.particular {
            cis.push(ci(&format!("ps{i}"), SOURCE_TYPE, Some(("clr_onyxdb_company_nit", format!("NIT-{i}")))));
            cis.push(ci(&format!("pc{i}"), "clr_onyxdb", Some(("clr_onyxdb_companynit", format!("700{i:04}")))));
            relations.push(rel(&format!("p{i}"), "usage", &format!("ps{i}"), &format!("pc{i}")));
        }

        for i in 0..self.consistent {
            let nit = format!("600{i:04}");
            cis.push(ci(&format!("os{i}"), SOURCE_TYPE, Some(("clr_onyxdb_company_nit", nit.clone()))));
            cis.push(ci(&format!("oc{i}"), "clr_onyxdb", Some(("clr_onyxdb_companynit", format!(" {nit} ")))));
            relations.push(rel(&format!("ok{i}"), "usage", &format!("os{i}"), &format!("oc{i}")));
        }

        relations.extend(containments);
        json!({ "cis": cis, "relations": relations })
    }

    /// Serialized snapshot
    pub fn to_body(&self) -> String {
        self.build().to_string()
    }
}

/// The 120 normal / 84 eligible scenario used across the end-to-end tests
pub fn standard_shape() -> SnapshotShape {
    SnapshotShape {
        normal: 120,
        eligible: 84,
        particular: 7,
        consistent: 30,
    }
}

fn ci(id: &str, ci_type: &str, nit: Option<(&str, String)>) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("display_label".into(), json!(format!("label {id}")));
    if let Some((field, value)) = nit {
        properties.insert(field.into(), json!(value));
    }
    json!({ "ucmdbId": id, "type": ci_type, "properties": properties })
}

fn rel(id: &str, rel_type: &str, end1: &str, end2: &str) -> Value {
    json!({ "ucmdbId": id, "type": rel_type, "end1Id": end1, "end2Id": end2 })
}
