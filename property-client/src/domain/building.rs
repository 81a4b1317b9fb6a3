use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Building {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    /// Name of the InfluxDB database holding this building's telemetry.
    pub influx_db_name: Option<String>,
    /// Tag key that carries the unit identifier, when the installation is known.
    pub influx_unit_tag: Option<String>,
    /// Tag key that carries the device serial number, when the installation is known.
    pub influx_device_tag: Option<String>,
    /// Compact measurement list, e.g. `sv_l[m3],teplo_kWh[kWh,heat]`.
    pub influx_measurements: Option<String>,
    pub units_fetched: bool,
}

impl Building {
    /// The configured time-series database, ignoring blank values.
    pub fn database(&self) -> Option<&str> {
        non_blank(self.influx_db_name.as_deref())
    }

    pub fn unit_tag_override(&self) -> Option<&str> {
        non_blank(self.influx_unit_tag.as_deref())
    }

    pub fn device_tag_override(&self) -> Option<&str> {
        non_blank(self.influx_device_tag.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
