// ----- standard library imports
// ----- extra library imports
use async_trait::async_trait;
use cashu::{
    CurrencyUnit, MintUrl, nut00 as cdk00, nut01 as cdk01, nut02 as cdk02, nut03 as cdk03,
    nut05 as cdk05, nut07 as cdk07, nut09 as cdk09, nut23 as cdk23,
};
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
// ----- local imports
use crate::error::{Error, Result};

// ----- end imports

///////////////////////////////////////////// MintInfo
/// The slice of `GET /v1/info` the engine acts on: NUT-15 multi-path support
/// and NUT-17 websocket commands. Unknown nuts are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MintInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nuts: NutsSupport,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NutsSupport {
    #[serde(rename = "15", default, skip_serializing_if = "Option::is_none")]
    pub nut15: Option<MppSettings>,
    #[serde(rename = "17", default, skip_serializing_if = "Option::is_none")]
    pub nut17: Option<WsSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MppSettings {
    #[serde(default)]
    pub methods: Vec<MppMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MppMethod {
    pub method: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsSettings {
    #[serde(default)]
    pub supported: Vec<WsMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMethod {
    pub method: String,
    pub unit: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl MintInfo {
    /// NUT-15 advertised for (method, unit)
    pub fn supports_mpp(&self, method: &str, unit: &CurrencyUnit) -> bool {
        let unit = unit.to_string();
        self.nuts
            .nut15
            .as_ref()
            .map(|mpp| {
                mpp.methods
                    .iter()
                    .any(|m| m.method == method && m.unit == unit)
            })
            .unwrap_or(false)
    }

    /// NUT-17 advertised for (method, unit, command)
    pub fn supports_ws(&self, method: &str, unit: &CurrencyUnit, command: &str) -> bool {
        let unit = unit.to_string();
        self.nuts
            .nut17
            .as_ref()
            .map(|ws| {
                ws.supported.iter().any(|m| {
                    m.method == method && m.unit == unit && m.commands.iter().any(|c| c == command)
                })
            })
            .unwrap_or(false)
    }
}

///////////////////////////////////////////// mint error envelope
#[derive(Debug, Deserialize)]
struct MintErrorEnvelope {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

const OUTPUTS_ALREADY_SIGNED_CODE: i64 = 10002;

/// Turns a mint response body that failed to parse as the expected type into
/// the matching error. Recognizes the outputs-already-signed condition so the
/// caller can resynchronize the keyset counter.
pub fn mint_error_from_value(value: Value) -> Error {
    let envelope: MintErrorEnvelope = match serde_json::from_value(value.clone()) {
        Ok(envelope) => envelope,
        Err(_) => return Error::Mint(value.to_string()),
    };
    let detail = envelope
        .detail
        .or(envelope.error)
        .unwrap_or_else(|| value.to_string());
    if envelope.code == Some(OUTPUTS_ALREADY_SIGNED_CODE)
        || detail.to_lowercase().contains("already signed")
    {
        return Error::OutputsAlreadySigned;
    }
    Error::Mint(detail)
}

fn parse_mint_response<T: DeserializeOwned>(value: Value) -> Result<T> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(mint_error_from_value(value)),
    }
}

///////////////////////////////////////////// own wire types
/// `POST /v1/mint/bolt11` body; outputs are NUT-13 derived blinded messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintBolt11Request {
    pub quote: String,
    pub outputs: Vec<cdk00::BlindedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintBolt11Response {
    pub signatures: Vec<cdk00::BlindSignature>,
}

///////////////////////////////////////////// MintConnector
/// REST surface of a Cashu mint. Every method addresses an explicit mint so
/// one client serves the whole registry (single-mint and MPP paths alike).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MintConnector: Send + Sync {
    async fn get_mint_info(&self, mint: MintUrl) -> Result<MintInfo>;
    async fn get_mint_keysets(&self, mint: MintUrl) -> Result<cdk02::KeysetResponse>;
    async fn get_mint_keyset(&self, mint: MintUrl, kid: cashu::Id) -> Result<cashu::KeySet>;
    async fn post_mint_quote(
        &self,
        mint: MintUrl,
        request: cdk23::MintQuoteBolt11Request,
    ) -> Result<cdk23::MintQuoteBolt11Response<String>>;
    async fn get_mint_quote_status(
        &self,
        mint: MintUrl,
        quote_id: String,
    ) -> Result<cdk23::MintQuoteBolt11Response<String>>;
    async fn post_mint(&self, mint: MintUrl, request: MintBolt11Request)
    -> Result<MintBolt11Response>;
    async fn post_melt_quote(
        &self,
        mint: MintUrl,
        request: cdk23::MeltQuoteBolt11Request,
    ) -> Result<cdk23::MeltQuoteBolt11Response<String>>;
    async fn get_melt_quote_status(
        &self,
        mint: MintUrl,
        quote_id: String,
    ) -> Result<cdk23::MeltQuoteBolt11Response<String>>;
    async fn post_melt(
        &self,
        mint: MintUrl,
        request: cdk05::MeltRequest<String>,
    ) -> Result<cdk23::MeltQuoteBolt11Response<String>>;
    async fn post_swap(&self, mint: MintUrl, request: cdk03::SwapRequest)
    -> Result<cdk03::SwapResponse>;
    async fn post_check_state(
        &self,
        mint: MintUrl,
        request: cdk07::CheckStateRequest,
    ) -> Result<cdk07::CheckStateResponse>;
    async fn post_restore(
        &self,
        mint: MintUrl,
        request: cdk09::RestoreRequest,
    ) -> Result<cdk09::RestoreResponse>;
}

///////////////////////////////////////////// HttpClient
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    http: ReqwestClient,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            http: ReqwestClient::new(),
        }
    }

    fn url(&self, mint: &MintUrl, path: &str) -> String {
        format!("{mint}/{path}")
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let value = self.http.get(url).send().await?.json::<Value>().await?;
        parse_mint_response(value)
    }

    async fn post<Req: Serialize, Res: DeserializeOwned>(
        &self,
        url: String,
        body: &Req,
    ) -> Result<Res> {
        let value = self
            .http
            .post(url)
            .json(body)
            .send()
            .await?
            .json::<Value>()
            .await?;
        parse_mint_response(value)
    }
}

#[async_trait]
impl MintConnector for HttpClient {
    async fn get_mint_info(&self, mint: MintUrl) -> Result<MintInfo> {
        self.get(self.url(&mint, "v1/info")).await
    }

    async fn get_mint_keysets(&self, mint: MintUrl) -> Result<cdk02::KeysetResponse> {
        self.get(self.url(&mint, "v1/keysets")).await
    }

    async fn get_mint_keyset(&self, mint: MintUrl, kid: cashu::Id) -> Result<cashu::KeySet> {
        let response: cdk01::KeysResponse =
            self.get(self.url(&mint, &format!("v1/keys/{kid}"))).await?;
        response
            .keysets
            .into_iter()
            .next()
            .ok_or(Error::NoKeysets)
    }

    async fn post_mint_quote(
        &self,
        mint: MintUrl,
        request: cdk23::MintQuoteBolt11Request,
    ) -> Result<cdk23::MintQuoteBolt11Response<String>> {
        self.post(self.url(&mint, "v1/mint/quote/bolt11"), &request)
            .await
    }

    async fn get_mint_quote_status(
        &self,
        mint: MintUrl,
        quote_id: String,
    ) -> Result<cdk23::MintQuoteBolt11Response<String>> {
        self.get(self.url(&mint, &format!("v1/mint/quote/bolt11/{quote_id}")))
            .await
    }

    async fn post_mint(
        &self,
        mint: MintUrl,
        request: MintBolt11Request,
    ) -> Result<MintBolt11Response> {
        self.post(self.url(&mint, "v1/mint/bolt11"), &request).await
    }

    async fn post_melt_quote(
        &self,
        mint: MintUrl,
        request: cdk23::MeltQuoteBolt11Request,
    ) -> Result<cdk23::MeltQuoteBolt11Response<String>> {
        self.post(self.url(&mint, "v1/melt/quote/bolt11"), &request)
            .await
    }

    async fn get_melt_quote_status(
        &self,
        mint: MintUrl,
        quote_id: String,
    ) -> Result<cdk23::MeltQuoteBolt11Response<String>> {
        self.get(self.url(&mint, &format!("v1/melt/quote/bolt11/{quote_id}")))
            .await
    }

    async fn post_melt(
        &self,
        mint: MintUrl,
        request: cdk05::MeltRequest<String>,
    ) -> Result<cdk23::MeltQuoteBolt11Response<String>> {
        self.post(self.url(&mint, "v1/melt/bolt11"), &request).await
    }

    async fn post_swap(
        &self,
        mint: MintUrl,
        request: cdk03::SwapRequest,
    ) -> Result<cdk03::SwapResponse> {
        self.post(self.url(&mint, "v1/swap"), &request).await
    }

    async fn post_check_state(
        &self,
        mint: MintUrl,
        request: cdk07::CheckStateRequest,
    ) -> Result<cdk07::CheckStateResponse> {
        self.post(self.url(&mint, "v1/checkstate"), &request).await
    }

    async fn post_restore(
        &self,
        mint: MintUrl,
        request: cdk09::RestoreRequest,
    ) -> Result<cdk09::RestoreResponse> {
        self.post(self.url(&mint, "v1/restore"), &request).await
    }
}
