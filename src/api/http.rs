//! 考试后端 HTTP 客户端
//!
//! 封装 start / resume / save / submit 四个接口的调用逻辑

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::ExamApi;
use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::{ResumeSnapshot, SavePayload, StartedAttempt, SubmitRequest, SubmitResult};

/// 考试后端客户端
#[derive(Debug, Clone)]
pub struct HttpExamApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpExamApi {
    /// 创建新的后端客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::api_request_failed("client", e))?;

        Ok(Self {
            client,
            base_url: config.base_api_url.trim_end_matches('/').to_string(),
            token: config.access_token.clone(),
        })
    }

    /// 拼接完整地址
    ///
    /// # 参数
    /// - `path`: 相对路径，如 `attempts/1/save/`
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// 构建带认证头的请求
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.endpoint_url(path))
            .header(ACCEPT, "application/json, text/plain, */*");

        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// 发送请求并检查状态码
    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                debug!("{} 连接失败，按离线处理: {}", endpoint, e);
                ApiError::Offline
            } else {
                ApiError::RequestFailed {
                    endpoint: endpoint.to_string(),
                    source: Box::new(e),
                }
            }
        })?;

        let status = response.status();
        debug!("{} -> HTTP {}", endpoint, status.as_u16());

        if !status.is_success() {
            return Err(ApiError::Rejected {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// 发送请求并解析 JSON 响应
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, endpoint: &str) -> Result<T, ApiError> {
        let response = self.send(builder, endpoint).await?;
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn start_exam(&self, exam_id: &str) -> Result<StartedAttempt, ApiError> {
        let path = format!("exams/{}/start/", exam_id);
        let builder = self.request(Method::POST, &path).json(&serde_json::json!({}));
        self.send_json(builder, &path).await
    }

    async fn fetch_resume(&self, attempt_id: &str) -> Result<ResumeSnapshot, ApiError> {
        let path = format!("attempts/{}/resume/", attempt_id);
        let builder = self.request(Method::GET, &path);
        self.send_json(builder, &path).await
    }

    async fn save_answer(&self, attempt_id: &str, payload: &SavePayload) -> Result<(), ApiError> {
        let path = format!("attempts/{}/save/", attempt_id);
        let builder = self.request(Method::POST, &path).json(payload);
        self.send(builder, &path).await?;
        Ok(())
    }

    async fn submit_exam(&self, exam_id: &str, request: &SubmitRequest) -> Result<SubmitResult, ApiError> {
        let path = format!("exams/{}/submit/", exam_id);
        let builder = self.request(Method::POST, &path).json(request);
        self.send_json(builder, &path).await
    }
}
