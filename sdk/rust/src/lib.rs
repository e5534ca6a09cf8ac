//! Typed device helpers built on top of the protocol client.
use std::net::IpAddr;

use miio::sdk::{ClientConfig, MiioClient};
use miio::MiioError;
use serde_json::{json, Value};

/// SDK error is the protocol error; device-reported errors surface as `Decode`.
pub type SdkError = MiioError;

/// A device addressed by IP and token, with JSON argument encoding for the
/// common methods.
#[derive(Debug, Clone)]
pub struct MiioDevice {
    inner: MiioClient,
}

impl MiioDevice {
    /// Builds a device handle from its address and 32-character hex token.
    pub fn connect(ip: IpAddr, token: &str) -> Result<Self, SdkError> {
        Ok(Self {
            inner: MiioClient::from_hex_token(ip, token)?,
        })
    }

    pub fn with_config(ip: IpAddr, token: &str, config: ClientConfig) -> Result<Self, SdkError> {
        let token = miio::sdk::parse_token(token)?;
        Ok(Self {
            inner: MiioClient::with_config(ip, token, config),
        })
    }

    pub fn client(&self) -> &MiioClient {
        &self.inner
    }

    /// `miIO.info`: model, firmware and network details.
    pub async fn info(&self) -> Result<Value, SdkError> {
        let response = self.inner.call_json("miIO.info", &[]).await?;
        take_result(response)
    }

    /// `get_prop`: one value per requested property, in request order.
    pub async fn get_properties(&self, names: &[&str]) -> Result<Vec<Value>, SdkError> {
        let response = self
            .inner
            .call_json("get_prop", &property_params(names))
            .await?;
        match take_result(response)? {
            Value::Array(values) => Ok(values),
            other => Err(MiioError::Decode(format!(
                "get_prop result is not an array: {}",
                other
            ))),
        }
    }

    /// `set_power` with `"on"` / `"off"`.
    pub async fn set_power(&self, on: bool) -> Result<Value, SdkError> {
        let response = self.inner.call_json("set_power", &power_params(on)).await?;
        take_result(response)
    }
}

pub fn property_params(names: &[&str]) -> Vec<Value> {
    names.iter().map(|name| json!(name)).collect()
}

pub fn power_params(on: bool) -> Vec<Value> {
    vec![json!(if on { "on" } else { "off" })]
}

fn take_result(mut response: Value) -> Result<Value, SdkError> {
    if let Some(error) = response.get("error") {
        return Err(MiioError::Decode(format!("device error: {}", error)));
    }
    response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| MiioError::Decode("response has no result".into()))
}
