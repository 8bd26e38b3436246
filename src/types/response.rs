use serde::{Deserialize, Serialize};

// ===== Upstream File API Response Types =====

#[derive(Debug, Serialize, Deserialize)]
pub struct FileApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: String,
    pub file_unique_id: Option<String>,
    pub file_size: Option<u64>,
    pub file_path: Option<String>,
}

// ===== REST Cache Response Types =====

#[derive(Debug, Deserialize)]
pub struct CacheRestResponse {
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}
