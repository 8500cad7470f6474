//! Environment-driven settings.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Administrator of the address directory.
    pub admin_id: Uuid,
    /// Privileged principal allowed to run the scheduled batch jobs.
    pub operator_id: Uuid,
}

impl Settings {
    /// Layer defaults under `COLEND_*` environment variables. The generated
    /// admin/operator fallbacks are logged at startup so a development
    /// deployment can mint matching tokens.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("jwt_secret", "secret_key_change_in_production")?
            .set_default("admin_id", Uuid::new_v4().to_string())?
            .set_default("operator_id", Uuid::new_v4().to_string())?
            .add_source(Environment::with_prefix("COLEND"))
            .build()?
            .try_deserialize()
    }
}
