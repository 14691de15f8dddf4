//! HTTP远程网关
//!
//! 对接标注后端的 REST 接口：
//! - `GET  /fetch-csv?username=` 会话快照
//! - `POST /fetch-patient-dicoms` 患者影像帧
//! - `POST /update-csv` 提交标签
//! - `GET  /reset-csv?username=&delete_all=true` 删除全部数据

use async_trait::async_trait;
use labeler_core::{Label, LabelerError, PatientStudyData, RemoteGateway, Result, SessionSnapshot};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP网关配置
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientRequest<'a> {
    patient_name: &'a str,
    username: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    patient_name: &'a str,
    dicom_name: &'a str,
    label: u8,
    username: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

/// 后端错误响应体
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// 基于 reqwest 的远程网关
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// 非 2xx 响应转换为带 detail 的错误
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(ErrorBody {
                detail: serde_json::Value::String(detail),
            }) => detail,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) => body,
        };

        warn!("Gateway responded with {}: {}", status, detail);
        Err(LabelerError::GatewayStatus {
            status: status.as_u16(),
            detail,
        })
    }
}

fn transport_error(e: reqwest::Error) -> LabelerError {
    LabelerError::Gateway(e.to_string())
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_session_snapshot(&self, user: &str) -> Result<SessionSnapshot> {
        debug!("Fetching session snapshot for {}", user);
        let response = self
            .client
            .get(self.url("fetch-csv"))
            .query(&[("username", user)])
            .send()
            .await
            .map_err(transport_error)?;

        Self::check(response)
            .await?
            .json::<SessionSnapshot>()
            .await
            .map_err(transport_error)
    }

    async fn fetch_study_data(&self, patient_id: &str, user: &str) -> Result<PatientStudyData> {
        debug!("Fetching study data for patient {}", patient_id);
        let response = self
            .client
            .post(self.url("fetch-patient-dicoms"))
            .json(&PatientRequest {
                patient_name: patient_id,
                username: user,
            })
            .send()
            .await
            .map_err(transport_error)?;

        Self::check(response)
            .await?
            .json::<PatientStudyData>()
            .await
            .map_err(transport_error)
    }

    async fn commit_label(
        &self,
        patient_id: &str,
        study_id: &str,
        label: Label,
        user: &str,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url("update-csv"))
            .json(&UpdateRequest {
                patient_name: patient_id,
                dicom_name: study_id,
                label: label.value(),
                username: user,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let body = Self::check(response).await?.text().await.map_err(transport_error)?;
        if body.trim().is_empty() {
            return Ok(());
        }

        // 2xx 但不是 JSON 的响应视为已接受
        let Ok(update) = serde_json::from_str::<UpdateResponse>(&body) else {
            debug!("Non-JSON update response accepted for {}/{}", patient_id, study_id);
            return Ok(());
        };
        if update.success {
            debug!("Committed label {} for {}/{}", label, patient_id, study_id);
            Ok(())
        } else {
            Err(LabelerError::Gateway(format!(
                "Server rejected label {} for {}/{}",
                label, patient_id, study_id
            )))
        }
    }

    async fn delete_all_data(&self, user: &str) -> Result<()> {
        let response = self
            .client
            .get(self.url("reset-csv"))
            .query(&[("username", user), ("delete_all", "true")])
            .send()
            .await
            .map_err(transport_error)?;

        Self::check(response).await?;
        Ok(())
    }
}
