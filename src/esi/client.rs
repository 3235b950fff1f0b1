use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{classify_status, Result};
use crate::esi::models::{
    ConstellationInfo, MarketOrder, MailRequest, SearchResponse, StationInfo, StructureInfo,
    SystemInfo,
};

/// Thin typed wrapper over the ESI REST API. Non-success statuses are
/// classified into the pipeline's failure kinds; callers decide whether a
/// failure is fatal for their run.
#[derive(Clone)]
pub struct EsiClient {
    http: reqwest::Client,
    base_url: String,
}

impl EsiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        Ok(response.json().await?)
    }

    // -- search ------------------------------------------------------------

    /// Public station search. Returns the matching station ids, empty when
    /// nothing matched.
    pub async fn search_stations(&self, term: &str) -> Result<Vec<i64>> {
        let url = format!("{}/v2/search/", self.base_url);
        let response: SearchResponse = self
            .fetch(self.http.get(&url).query(&[
                ("categories", "station"),
                ("search", term),
                ("strict", "false"),
            ]))
            .await?;
        Ok(response.station.unwrap_or_default())
    }

    /// Structure search scoped to what `character_id` can see.
    pub async fn search_structures(
        &self,
        character_id: i64,
        term: &str,
        token: &str,
    ) -> Result<Vec<i64>> {
        let url = format!("{}/v3/characters/{}/search/", self.base_url, character_id);
        let response: SearchResponse = self
            .fetch(self.http.get(&url).bearer_auth(token).query(&[
                ("categories", "structure"),
                ("search", term),
                ("strict", "false"),
            ]))
            .await?;
        Ok(response.structure.unwrap_or_default())
    }

    // -- name resolution ---------------------------------------------------

    pub async fn station_info(&self, station_id: i64) -> Result<StationInfo> {
        let url = format!("{}/v2/universe/stations/{}/", self.base_url, station_id);
        self.fetch(self.http.get(&url)).await
    }

    /// Resolving a structure also verifies the caller's ACL — a denial
    /// surfaces as `AccessDenied`.
    pub async fn structure_info(&self, structure_id: i64, token: &str) -> Result<StructureInfo> {
        let url = format!("{}/v2/universe/structures/{}/", self.base_url, structure_id);
        self.fetch(self.http.get(&url).bearer_auth(token)).await
    }

    // -- region hops -------------------------------------------------------

    pub async fn system_constellation(&self, system_id: i64) -> Result<i64> {
        let url = format!("{}/v4/universe/systems/{}/", self.base_url, system_id);
        let info: SystemInfo = self.fetch(self.http.get(&url)).await?;
        Ok(info.constellation_id)
    }

    pub async fn constellation_region(&self, constellation_id: i64) -> Result<i64> {
        let url = format!("{}/v1/universe/constellations/{}/", self.base_url, constellation_id);
        let info: ConstellationInfo = self.fetch(self.http.get(&url)).await?;
        Ok(info.region_id)
    }

    // -- market orders -----------------------------------------------------

    /// All open orders at a player structure, paginated until an empty page.
    pub async fn structure_orders(&self, structure_id: i64, token: &str) -> Result<Vec<MarketOrder>> {
        let url = format!("{}/v1/markets/structures/{}/", self.base_url, structure_id);
        let mut orders = Vec::new();
        let mut page = 1u32;
        loop {
            let chunk: Vec<MarketOrder> = self
                .fetch(self.http.get(&url).bearer_auth(token).query(&[("page", page)]))
                .await?;
            debug!(structure_id, page, count = chunk.len(), "fetched structure order page");
            if chunk.is_empty() {
                break;
            }
            orders.extend(chunk);
            page += 1;
        }
        Ok(orders)
    }

    /// All open orders in a region (covers every NPC station in it),
    /// paginated until an empty page.
    pub async fn region_orders(&self, region_id: i64) -> Result<Vec<MarketOrder>> {
        let url = format!("{}/v1/markets/{}/orders/", self.base_url, region_id);
        let mut orders = Vec::new();
        let mut page = 1u32;
        loop {
            let chunk: Vec<MarketOrder> = self
                .fetch(
                    self.http
                        .get(&url)
                        .query(&[("order_type", "all")])
                        .query(&[("page", page)]),
                )
                .await?;
            debug!(region_id, page, count = chunk.len(), "fetched region order page");
            if chunk.is_empty() {
                break;
            }
            orders.extend(chunk);
            page += 1;
        }
        Ok(orders)
    }

    /// Cheap access probe: fetch the first order page and discard it.
    pub async fn probe_structure_market(&self, structure_id: i64, token: &str) -> Result<()> {
        let url = format!("{}/v1/markets/structures/{}/", self.base_url, structure_id);
        let _: Vec<MarketOrder> = self
            .fetch(self.http.get(&url).bearer_auth(token).query(&[("page", 1u32)]))
            .await?;
        Ok(())
    }

    // -- mail --------------------------------------------------------------

    pub async fn send_mail(
        &self,
        sender_character_id: i64,
        token: &str,
        request: &MailRequest,
    ) -> Result<()> {
        let url = format!("{}/v1/characters/{}/mail/", self.base_url, sender_character_id);
        let response = self.http.post(&url).bearer_auth(token).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        Ok(())
    }
}
