//! Fake listing provider for integration testing.
//!
//! Implements `Transport` over in-memory fixtures: a search result set,
//! per-property details and comps, and a recently-sold pool. Every
//! request is recorded so tests can assert on network traffic. Clones
//! share state, so a test can keep a handle after handing one to the
//! gateway.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arv_scout::provider::{HttpReply, RequestParams, Transport};

#[derive(Default)]
struct State {
    listings: Vec<Value>,
    details: HashMap<String, Value>,
    comps: HashMap<String, Vec<Value>>,
    sold: Vec<Value>,
    /// Path → (status, body) answered on every call.
    fixed: HashMap<String, (u16, String)>,
    /// Path → (status, remaining) answered before falling through.
    transient: HashMap<String, (u16, u32)>,
    calls: Vec<(String, RequestParams)>,
}

#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<State>>,
}

impl FakeProvider {
    /// Two single-family listings in Austin with five clean comps each.
    pub fn austin() -> Self {
        let fake = Self::default();
        for (zpid, lat) in [("101", 30.2672), ("102", 30.2710)] {
            fake.add_property(zpid, lat, -97.7431);
            let comps = (0..5)
                .map(|i| comp(&format!("{zpid}{i}"), 100.0 + 10.0 * i as f64, "SINGLE_FAMILY"))
                .collect();
            fake.set_comps(zpid, comps);
        }
        fake
    }

    pub fn add_property(&self, zpid: &str, lat: f64, lng: f64) {
        let mut state = self.state.lock().unwrap();
        state.listings.push(json!({
            "zpid": zpid,
            "address": format!("{zpid} Elm St, Austin, TX 78701"),
            "price": 150000,
            "bedrooms": 3,
            "bathrooms": 2,
            "livingArea": 1500,
            "listingStatus": "FOR_SALE",
            "daysOnZillow": 21,
            "detailUrl": format!("/homedetails/{zpid}_zpid/")
        }));
        state.details.insert(
            zpid.to_string(),
            json!({
                "zpid": zpid,
                "address": {
                    "streetAddress": format!("{zpid} Elm St"),
                    "city": "Austin",
                    "state": "TX",
                    "zipcode": "78701"
                },
                "latitude": lat,
                "longitude": lng,
                "homeStatus": "FOR_SALE",
                "daysOnZillow": 21,
                "price": 150000,
                "bedrooms": 3,
                "bathrooms": 2,
                "livingArea": 1500,
                "lotSize": 6000,
                "yearBuilt": 1962,
                "homeType": "SINGLE_FAMILY"
            }),
        );
    }

    pub fn set_comps(&self, zpid: &str, comps: Vec<Value>) {
        self.state.lock().unwrap().comps.insert(zpid.to_string(), comps);
    }

    pub fn set_sold(&self, sold: Vec<Value>) {
        self.state.lock().unwrap().sold = sold;
    }

    /// Modify the details fixture of one property.
    pub fn edit_details(&self, zpid: &str, edit: impl FnOnce(&mut Value)) {
        let mut state = self.state.lock().unwrap();
        if let Some(details) = state.details.get_mut(zpid) {
            edit(details);
        }
    }

    /// Answer every request to `path` with `status`.
    pub fn fix_status(&self, path: &str, status: u16) {
        self.fix_reply(path, status, "fixed failure");
    }

    /// Answer every request to `path` with `status` and `body`.
    pub fn fix_reply(&self, path: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .fixed
            .insert(path.to_string(), (status, body.to_string()));
    }

    /// Answer the next `times` requests to `path` with `status`.
    pub fn fail_next(&self, path: &str, status: u16, times: u32) {
        self.state
            .lock()
            .unwrap()
            .transient
            .insert(path.to_string(), (status, times));
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }

    pub fn params_of(&self, path: &str) -> Vec<RequestParams> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

/// A comparable sale of 1500 sqft at `ppsf`.
pub fn comp(zpid: &str, ppsf: f64, home_type: &str) -> Value {
    json!({
        "zpid": zpid,
        "price": ppsf * 1500.0,
        "livingArea": 1500,
        "bedrooms": 3,
        "bathrooms": 2,
        "lotAreaValue": 6500,
        "homeType": home_type,
        "latitude": 30.268,
        "longitude": -97.744,
        "dateSold": "2026-06-15"
    })
}

#[async_trait]
impl Transport for FakeProvider {
    async fn get(&self, path: &str, params: &RequestParams) -> Result<HttpReply> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((path.to_string(), params.clone()));

        if let Some((status, body)) = state.fixed.get(path) {
            return Ok(HttpReply::new(*status, body.clone()));
        }
        if let Some((status, remaining)) = state.transient.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(HttpReply::new(*status, "transient failure"));
            }
        }

        let zpid = params.get("zpid").unwrap_or_default().to_string();
        let body = match path {
            "/propertyExtendedSearch" if params.get("status_type") == Some("RecentlySold") => {
                json!({ "props": state.sold })
            }
            "/propertyExtendedSearch" => match params.get("page") {
                Some("1") => json!({ "props": state.listings, "totalPages": 1 }),
                _ => json!({ "props": [] }),
            },
            "/property" => match state.details.get(&zpid) {
                Some(details) => details.clone(),
                None => return Ok(HttpReply::new(404, "Property not found")),
            },
            "/propertyComps" => json!({ "comps": state.comps.get(&zpid).cloned().unwrap_or_default() }),
            other => return Ok(HttpReply::new(404, format!("Endpoint '{other}' does not exist"))),
        };
        Ok(HttpReply::new(200, body.to_string()))
    }
}
