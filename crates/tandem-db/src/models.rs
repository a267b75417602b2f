/// Database row types: these map directly to SQLite rows.
/// Distinct from the tandem-types models.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub preferred_language: String,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub original_text: String,
    pub source_language: String,
    pub pivot_text: String,
    pub created_at: String,
}
