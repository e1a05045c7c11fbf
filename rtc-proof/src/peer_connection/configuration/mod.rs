pub mod setting_engine;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::peer_connection::transport::ice::server::{IceUrl, RTCIceServer};
use setting_engine::SettingEngine;

/// A Configuration defines how peer-to-peer communication via PeerConnection
/// is established or re-established.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RTCConfiguration {
    /// Servers available to be used by ICE, such as STUN and TURN servers.
    pub(crate) ice_servers: Vec<RTCIceServer>,

    pub(crate) setting_engine: SettingEngine,
}

impl RTCConfiguration {
    /// Checks every ICE server url and TURN credential.
    pub fn validate(&self) -> Result<()> {
        for ice_server in &self.ice_servers {
            ice_server.validate()?;
        }
        Ok(())
    }

    pub fn ice_servers(&self) -> &[RTCIceServer] {
        &self.ice_servers
    }

    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    /// Every server url in configuration order.
    pub(crate) fn get_ice_urls(&self) -> Result<Vec<IceUrl>> {
        let mut urls = vec![];
        for ice_server in &self.ice_servers {
            urls.extend(ice_server.urls()?);
        }
        Ok(urls)
    }
}

#[derive(Default)]
pub struct RTCConfigurationBuilder {
    ice_servers: Vec<RTCIceServer>,
    setting_engine: SettingEngine,
}

impl RTCConfigurationBuilder {
    pub fn new() -> Self {
        RTCConfigurationBuilder::default()
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<RTCIceServer>) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    pub fn with_setting_engine(mut self, setting_engine: SettingEngine) -> Self {
        self.setting_engine = setting_engine;
        self
    }

    pub fn build(self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers,
            setting_engine: self.setting_engine,
        }
    }
}
