use axum::{
    Extension,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::secrets::{self, SecretString};
use crate::http::AppState;
use crate::http::middleware::ClientIp;
use crate::job::{Job, Reply};
use crate::model::inspect_link::is_only_digits;
use crate::model::{ClientId, Failure, InspectFields, InspectLink};

#[derive(Debug, Default, Deserialize)]
pub struct InspectQuery {
    pub url: Option<String>,
    pub s: Option<String>,
    pub a: Option<String>,
    pub d: Option<String>,
    pub m: Option<String>,
    pub price: Option<String>,
    #[serde(rename = "priceKey")]
    pub price_key: Option<String>,
}

impl InspectQuery {
    /// The valid link named by this query.
    ///
    /// A query naming no link is `BadParams`; one naming a malformed link
    /// is `InvalidInspect`.
    fn link(&self) -> Result<InspectLink, Failure> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return InspectLink::try_parse(url)
                .filter(InspectLink::is_valid)
                .ok_or(Failure::InvalidInspect);
        }

        let present = |v: &Option<String>| v.as_deref().is_some_and(|v| !v.is_empty());
        if !(present(&self.a) && present(&self.d) && (present(&self.s) || present(&self.m))) {
            return Err(Failure::BadParams);
        }

        let link = InspectLink::from_fields(&InspectFields {
            s: self.s.clone(),
            a: self.a.clone(),
            d: self.d.clone(),
            m: self.m.clone(),
        });
        if link.is_valid() {
            Ok(link)
        } else {
            Err(Failure::InvalidInspect)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkLink {
    pub link: String,
    #[serde(default)]
    pub price: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
    pub links: Vec<BulkLink>,
    #[serde(default, rename = "priceKey")]
    pub price_key: Option<String>,
}

/// The price to forward with a lookup, if the caller may set one.
///
/// Requires a configured price key that matches, an all-digit price, and a
/// market link. Anything else drops the price silently, and so does an
/// all-digit price too large for a `u64`; the lookup itself still runs.
pub fn can_submit_price(
    configured: Option<&SecretString>,
    supplied_key: Option<&str>,
    link: &InspectLink,
    price: Option<&str>,
) -> Option<u64> {
    let price = price.filter(|p| !p.is_empty() && is_only_digits(p))?;
    if !secrets::matches(configured, supplied_key) || !link.is_market_link() {
        return None;
    }
    price.parse().ok()
}

/// `GET /` with `url=` or `s`/`a`/`d`/`m`.
pub async fn inspect_handler(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    query: Result<Query<InspectQuery>, QueryRejection>,
) -> Reply {
    let Ok(Query(query)) = query else {
        return Reply::failure(Failure::BadParams);
    };

    let link = match query.link() {
        Ok(link) => link,
        Err(failure) => return Reply::failure(failure),
    };

    let price = can_submit_price(
        state.keys.price_key.as_ref(),
        query.price_key.as_deref(),
        &link,
        query.price.as_deref(),
    );

    let mut job = Job::new(ClientId::new(ip));
    job.enqueue(link, price);
    state.service.handle(job).await
}

/// `POST /bulk` with `{links: [{link, price?}], bulk_key?, priceKey?}`.
pub async fn bulk_handler(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    body: Bytes,
) -> Reply {
    let Ok(raw) = serde_json::from_slice::<Value>(&body) else {
        return Reply::failure(Failure::BadBody);
    };

    if state.keys.bulk_key.is_some() {
        let supplied = raw.get("bulk_key").and_then(Value::as_str);
        if !secrets::matches(state.keys.bulk_key.as_ref(), supplied) {
            return Reply::failure(Failure::BadSecret);
        }
    }

    let Ok(body) = serde_json::from_value::<BulkBody>(raw) else {
        return Reply::failure(Failure::BadBody);
    };

    if body.links.is_empty() {
        return Reply::failure(Failure::BadBody);
    }

    let max_requests = state.service.limits().max_simultaneous_requests;
    if max_requests > 0 && body.links.len() > max_requests {
        return Reply::failure(Failure::MaxRequests);
    }

    let mut job = Job::new(ClientId::new(ip));
    for entry in &body.links {
        let Some(link) = InspectLink::try_parse(&entry.link).filter(InspectLink::is_valid) else {
            debug!(link = %entry.link, "invalid link in bulk request");
            return Reply::failure(Failure::InvalidInspect);
        };

        let price = entry.price.as_ref().map(price_text);
        let price = can_submit_price(
            state.keys.price_key.as_ref(),
            body.price_key.as_deref(),
            &link,
            price.as_deref(),
        );
        job.enqueue(link, price);
    }

    state.service.handle(job).await
}

// Bulk prices arrive as either JSON numbers or strings.
fn price_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
