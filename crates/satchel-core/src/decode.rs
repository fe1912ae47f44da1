// ----- standard library imports
use std::str::FromStr;
use std::sync::Arc;
// ----- extra library imports
use async_trait::async_trait;
use cashu::{CurrencyUnit, nut18 as cdk18};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
// ----- local imports
use crate::error::{Error, Result};
use crate::types::{DecodedInvoice, LnurlPayData};

// ----- end imports

const COINBASE_RATES_URL: &str = "https://api.coinbase.com/v2/exchange-rates?currency=BTC";
// bech32 word cap for lnurl1 payloads
const LNURL_MAX_LEN: usize = 20_000;

///////////////////////////////////////////// IncomingRequest
/// What a pasted or scanned string turned out to be.
#[derive(Debug, Clone)]
pub enum IncomingRequest {
    /// BOLT-11 invoice, ready for the melt quote flow
    Bolt11(DecodedInvoice),
    /// LNURL-pay endpoint resolved to its first-step metadata
    LnurlPay(LnurlPayData),
    /// `cashuA…`/`cashuB…` token to receive
    TokenReceive(String),
    /// P2PK public key to lock a send to
    P2pk(String),
    /// mint URL to add/activate
    MintUrl(String),
    /// NUT-18 payment request
    PaymentRequest(cdk18::PaymentRequest),
}

///////////////////////////////////////////// LNURL wire types
#[derive(Debug, Clone, Deserialize)]
pub struct LnurlPayResponse {
    pub callback: String,
    #[serde(rename = "minSendable")]
    pub min_sendable: u64,
    #[serde(rename = "maxSendable")]
    pub max_sendable: u64,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LnurlInvoiceResponse {
    pub pr: String,
}

///////////////////////////////////////////// LnurlConnector
/// Outbound HTTP the decoder needs: LNURL endpoints and the BTC-USD spot
/// rate used to size payments on usd-unit wallets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LnurlConnector: Send + Sync {
    async fn get_pay_request(&self, url: String) -> Result<LnurlPayResponse>;
    async fn get_invoice(&self, url: String) -> Result<LnurlInvoiceResponse>;
    async fn get_btc_usd_price(&self) -> Result<f64>;
}

fn lnurl_result<T: DeserializeOwned>(value: Value) -> Result<T> {
    if value.get("status").and_then(|s| s.as_str()) == Some("ERROR") {
        let reason = value
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown lnurl error")
            .to_string();
        return Err(Error::Lnurl(reason));
    }
    Ok(serde_json::from_value(value)?)
}

///////////////////////////////////////////// LnurlHttpClient
#[derive(Debug, Clone, Default)]
pub struct LnurlHttpClient {
    http: reqwest::Client,
}

#[async_trait]
impl LnurlConnector for LnurlHttpClient {
    async fn get_pay_request(&self, url: String) -> Result<LnurlPayResponse> {
        let value = self.http.get(url).send().await?.json::<Value>().await?;
        lnurl_result(value)
    }

    async fn get_invoice(&self, url: String) -> Result<LnurlInvoiceResponse> {
        let value = self.http.get(url).send().await?.json::<Value>().await?;
        lnurl_result(value)
    }

    async fn get_btc_usd_price(&self) -> Result<f64> {
        #[derive(Deserialize)]
        struct Rates {
            data: RatesData,
        }
        #[derive(Deserialize)]
        struct RatesData {
            rates: std::collections::HashMap<String, String>,
        }
        let rates: Rates = self
            .http
            .get(COINBASE_RATES_URL)
            .send()
            .await?
            .json()
            .await?;
        let usd = rates
            .data
            .rates
            .get("USD")
            .ok_or_else(|| Error::Lnurl("no USD rate in response".into()))?;
        usd.parse::<f64>()
            .map_err(|e| Error::Lnurl(format!("bad USD rate: {e}")))
    }
}

///////////////////////////////////////////// classification helpers
fn is_ln_address(input: &str) -> bool {
    let Some((user, host)) = input.split_once('@') else {
        return false;
    };
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '~' | '_');
    !user.is_empty() && !host.is_empty() && user.chars().all(allowed) && host.chars().all(allowed)
}

fn is_p2pk_pubkey(input: &str) -> bool {
    input.len() == 66
        && input.chars().all(|c| c.is_ascii_hexdigit())
        && input.parse::<cashu::nut01::PublicKey>().is_ok()
}

fn query_value<'q>(input: &'q str, key: &str) -> Option<&'q str> {
    let start = input.find(key)? + key.len();
    let rest = &input[start..];
    Some(rest.split('&').next().unwrap_or(rest))
}

pub fn decode_bolt11(raw: &str) -> Result<DecodedInvoice> {
    let invoice =
        cashu::Bolt11Invoice::from_str(raw).map_err(|e| Error::DecodeFailed(e.to_string()))?;
    Ok(DecodedInvoice {
        bolt11: raw.to_string(),
        amount_sat: invoice.amount_milli_satoshis().unwrap_or(0) / 1000,
        payment_hash: invoice.payment_hash().to_string(),
        description: invoice.description().to_string(),
        timestamp: invoice.duration_since_epoch().as_secs(),
        expiry: invoice.expiry_time().as_secs(),
    })
}

fn lnurl_bech32_to_url(encoded: &str) -> Result<String> {
    if encoded.len() > LNURL_MAX_LEN {
        return Err(Error::DecodeFailed("lnurl payload too long".into()));
    }
    let (hrp, data) =
        bech32::decode(encoded).map_err(|e| Error::DecodeFailed(format!("lnurl bech32: {e}")))?;
    if hrp.as_str() != "lnurl" {
        return Err(Error::DecodeFailed(format!("unexpected hrp {hrp}")));
    }
    String::from_utf8(data).map_err(|e| Error::DecodeFailed(format!("lnurl utf8: {e}")))
}

///////////////////////////////////////////// RequestDecoder
/// Classifies user-supplied strings and resolves LNURL endpoints into
/// invoices the quote engine can consume. First matching rule wins.
pub struct RequestDecoder {
    lnurl: Arc<dyn LnurlConnector>,
}

impl RequestDecoder {
    pub fn new(lnurl: Arc<dyn LnurlConnector>) -> Self {
        Self { lnurl }
    }

    pub async fn decode(&self, input: &str) -> Result<IncomingRequest> {
        let req = input.trim();
        let lower = req.to_lowercase();

        if lower.starts_with("lnbc") {
            return Ok(IncomingRequest::Bolt11(decode_bolt11(req)?));
        }
        if lower.starts_with("lightning:") {
            return Ok(IncomingRequest::Bolt11(decode_bolt11(&req[10..])?));
        }
        if lower.starts_with("bitcoin:") {
            let invoice = query_value(req, "lightning=")
                .ok_or_else(|| Error::DecodeFailed("bitcoin uri without lightning part".into()))?;
            return Ok(IncomingRequest::Bolt11(decode_bolt11(invoice)?));
        }
        if lower.starts_with("lnurl:") {
            return self.lnurl_pay(&req[6..]).await;
        }
        if lower.contains("lightning=lnurl1") {
            let encoded = query_value(&lower, "lightning=")
                .expect("contains check guarantees the key")
                .to_string();
            return self.lnurl_pay(&encoded).await;
        }
        if lower.starts_with("lnurl1") || is_ln_address(req) {
            return self.lnurl_pay(req).await;
        }
        if req.starts_with("cashuA") || req.starts_with("cashuB") {
            return Ok(IncomingRequest::TokenReceive(req.to_string()));
        }
        if let Some(idx) = req.find("token=cashu") {
            return Ok(IncomingRequest::TokenReceive(req[idx + 6..].to_string()));
        }
        if is_p2pk_pubkey(req) {
            return Ok(IncomingRequest::P2pk(req.to_string()));
        }
        if lower.starts_with("http") {
            return Ok(IncomingRequest::MintUrl(req.to_string()));
        }
        if req.starts_with("creqA") {
            let request = cdk18::PaymentRequest::from_str(req)
                .map_err(|e| Error::DecodeFailed(e.to_string()))?;
            return Ok(IncomingRequest::PaymentRequest(request));
        }
        Err(Error::DecodeFailed(format!(
            "unrecognized request: {}",
            req.chars().take(24).collect::<String>()
        )))
    }

    /// First LNURL step: resolve the endpoint and fetch its pay-request
    /// metadata. `min == max` fixes the amount up front.
    async fn lnurl_pay(&self, target: &str) -> Result<IncomingRequest> {
        let (url, domain) = if let Some((user, host)) = target.split_once('@') {
            (
                format!("https://{host}/.well-known/lnurlp/{user}"),
                host.to_string(),
            )
        } else {
            let decoded = lnurl_bech32_to_url(&target.to_lowercase())?;
            let domain = url::Url::parse(&decoded)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();
            (decoded, domain)
        };
        tracing::debug!("resolving lnurl pay endpoint at {domain}");
        let pay = self.lnurl.get_pay_request(url).await?;
        if pay.tag != "payRequest" {
            return Err(Error::Lnurl(format!("unexpected tag: {}", pay.tag)));
        }
        let fixed_amount_sat =
            (pay.min_sendable == pay.max_sendable).then_some(pay.max_sendable / 1000);
        Ok(IncomingRequest::LnurlPay(LnurlPayData {
            callback: pay.callback,
            min_sendable_msat: pay.min_sendable,
            max_sendable_msat: pay.max_sendable,
            metadata: pay.metadata,
            domain,
            fixed_amount_sat,
        }))
    }

    /// Second LNURL step: turn an entered amount into an invoice. On a usd
    /// wallet the amount is US dollars and is converted through the BTC spot
    /// price; otherwise it is sats.
    pub async fn lnurl_fetch_invoice(
        &self,
        data: &LnurlPayData,
        amount: f64,
        unit: &CurrencyUnit,
    ) -> Result<DecodedInvoice> {
        let amount_sat = if *unit == CurrencyUnit::Usd {
            let price = self.lnurl.get_btc_usd_price().await?;
            if price <= 0.0 {
                return Err(Error::Lnurl("invalid BTC-USD price".into()));
            }
            (amount * (1.0 / (price / 1e8))).floor() as u64
        } else {
            amount.floor() as u64
        };
        let amount_msat = amount_sat * 1000;
        if amount_msat < data.min_sendable_msat || amount_msat > data.max_sendable_msat {
            return Err(Error::Lnurl(format!(
                "amount {amount_msat} msat outside [{}, {}]",
                data.min_sendable_msat, data.max_sendable_msat
            )));
        }
        let url = format!("{}?amount={amount_msat}", data.callback);
        let response = self.lnurl.get_invoice(url).await?;
        decode_bolt11(&response.pr)
    }
}
