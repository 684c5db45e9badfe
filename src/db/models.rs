/// One cached analysis, as listed by `Database::list_analyses`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    pub track_id: String,
    pub source_path: Option<String>,
    /// Number of fields cached for the track.
    pub field_count: i64,
    pub created_at: String,
    pub updated_at: String,
}
