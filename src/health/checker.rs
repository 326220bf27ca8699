//! 健康检查器
//!
//! 检查器是一个封闭的枚举，按集群配置选择，不做运行时插件发现。
//! 探测失败不会以错误形式向外传播，只会变成 [`ProbeOutcome`]。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP 建连超时
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// MySQL 探活默认语句
pub const MYSQL_DEFAULT_CMD: &str = "show global variables where variable_name='read_only'";

/// 检查器类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    None,
    #[default]
    Tcp,
    Http,
    Mysql,
}

impl HealthCheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheckType::None => "none",
            HealthCheckType::Tcp => "tcp",
            HealthCheckType::Http => "http",
            HealthCheckType::Mysql => "mysql",
        }
    }
}

impl std::fmt::Display for HealthCheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 集群级健康检查器配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HealthChecker {
    /// 不探测，健康状态只由外部设置
    None,
    #[default]
    Tcp,
    Http {
        #[serde(default = "default_http_path")]
        path: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_expected_code")]
        expected_code: u16,
    },
    Mysql {
        user: String,
        #[serde(default)]
        password: String,
        #[serde(default = "default_mysql_cmd")]
        cmd: String,
    },
}

fn default_http_path() -> String {
    "/".to_string()
}

fn default_expected_code() -> u16 {
    200
}

fn default_mysql_cmd() -> String {
    MYSQL_DEFAULT_CMD.to_string()
}

/// 单次探测结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    /// 可能是暂时性的失败（超时、5xx），计入阈值
    Unhealthy { reason: String },
    /// 明确不可达（连接被拒绝），立即置为不健康
    Unreachable { reason: String },
    /// 未执行探测
    Skipped,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }

    pub fn reason(&self) -> &str {
        match self {
            ProbeOutcome::Healthy => "probe ok",
            ProbeOutcome::Unhealthy { reason } | ProbeOutcome::Unreachable { reason } => reason,
            ProbeOutcome::Skipped => "probe skipped",
        }
    }
}

/// 探测上下文，由检查反应器创建并在所有探测间共享
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub http: reqwest::Client,
    pub timeout: Duration,
}

impl ProbeContext {
    pub fn new(timeout: Duration) -> Self {
        // 不跟随重定向，302 需要被识别为失败
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, timeout }
    }
}

impl HealthChecker {
    /// 按类型取默认配置的检查器
    pub fn from_type(check_type: HealthCheckType) -> Self {
        match check_type {
            HealthCheckType::None => HealthChecker::None,
            HealthCheckType::Tcp => HealthChecker::Tcp,
            HealthCheckType::Http => HealthChecker::Http {
                path: default_http_path(),
                headers: HashMap::new(),
                expected_code: default_expected_code(),
            },
            HealthCheckType::Mysql => HealthChecker::Mysql {
                user: String::new(),
                password: String::new(),
                cmd: default_mysql_cmd(),
            },
        }
    }

    pub fn check_type(&self) -> HealthCheckType {
        match self {
            HealthChecker::None => HealthCheckType::None,
            HealthChecker::Tcp => HealthCheckType::Tcp,
            HealthChecker::Http { .. } => HealthCheckType::Http,
            HealthChecker::Mysql { .. } => HealthCheckType::Mysql,
        }
    }

    /// 对目标地址执行一次探测
    pub async fn probe(&self, target: SocketAddr, ctx: &ProbeContext) -> ProbeOutcome {
        match self {
            HealthChecker::None => ProbeOutcome::Skipped,
            HealthChecker::Tcp => probe_tcp(target).await,
            HealthChecker::Http {
                path,
                headers,
                expected_code,
            } => probe_http(target, path, headers, *expected_code, ctx).await,
            HealthChecker::Mysql {
                user,
                password,
                cmd,
            } => probe_mysql(target, user, password, cmd, ctx).await,
        }
    }
}

async fn probe_tcp(target: SocketAddr) -> ProbeOutcome {
    match tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => ProbeOutcome::Healthy,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => ProbeOutcome::Unreachable {
            reason: format!("tcp:refused {target}"),
        },
        Ok(Err(e)) => ProbeOutcome::Unhealthy {
            reason: format!("tcp:error {target}: {e}"),
        },
        Err(_) => ProbeOutcome::Unhealthy {
            reason: format!("tcp:timeout {target}"),
        },
    }
}

async fn probe_http(
    target: SocketAddr,
    path: &str,
    headers: &HashMap<String, String>,
    expected_code: u16,
    ctx: &ProbeContext,
) -> ProbeOutcome {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let url = format!("http://{target}{path}");
    let mut request = ctx.http.get(&url).timeout(ctx.timeout);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    match request.send().await {
        Ok(resp) => {
            let code = resp.status().as_u16();
            if code == expected_code {
                ProbeOutcome::Healthy
            } else if code == 503 || code == 302 {
                ProbeOutcome::Unhealthy {
                    reason: format!("http:error code {code}"),
                }
            } else {
                ProbeOutcome::Unreachable {
                    reason: format!("http:error code {code}"),
                }
            }
        }
        Err(e) if e.is_timeout() => ProbeOutcome::Unhealthy {
            reason: format!("http:timeout {url}"),
        },
        Err(e) if e.is_connect() => ProbeOutcome::Unreachable {
            reason: format!("http:unable to connect {url}: {e}"),
        },
        Err(e) => ProbeOutcome::Unhealthy {
            reason: format!("http:error {url}: {e}"),
        },
    }
}

#[cfg(feature = "mysql")]
async fn probe_mysql(
    target: SocketAddr,
    user: &str,
    password: &str,
    cmd: &str,
    ctx: &ProbeContext,
) -> ProbeOutcome {
    use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
    use sqlx::{Connection, Row};

    let options = MySqlConnectOptions::new()
        .host(&target.ip().to_string())
        .port(target.port())
        .username(user)
        .password(password);

    let query = async {
        let mut conn = MySqlConnection::connect_with(&options).await?;
        let rows = sqlx::query(cmd).fetch_all(&mut conn).await?;
        let _ = conn.close().await;
        Ok::<_, sqlx::Error>(rows)
    };

    match tokio::time::timeout(ctx.timeout, query).await {
        Err(_) => ProbeOutcome::Unhealthy {
            reason: format!("mysql:timeout {target}"),
        },
        Ok(Err(sqlx::Error::Io(e))) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            ProbeOutcome::Unreachable {
                reason: format!("mysql:refused {target}"),
            }
        }
        Ok(Err(e)) => ProbeOutcome::Unhealthy {
            reason: format!("mysql:error {target}: {e}"),
        },
        Ok(Ok(rows)) => {
            // 只读实例（从库）视为不健康
            let read_only = rows.iter().any(|row| {
                row.try_get::<String, _>(1)
                    .map(|v| v.eq_ignore_ascii_case("ON"))
                    .unwrap_or(false)
            });
            if read_only {
                ProbeOutcome::Unhealthy {
                    reason: format!("mysql:slave {target}"),
                }
            } else {
                ProbeOutcome::Healthy
            }
        }
    }
}

#[cfg(not(feature = "mysql"))]
async fn probe_mysql(
    target: SocketAddr,
    _user: &str,
    _password: &str,
    _cmd: &str,
    _ctx: &ProbeContext,
) -> ProbeOutcome {
    tracing::warn!(
        target: "naming::health",
        target_addr = %target,
        "MySQL health check requested but the `mysql` feature is disabled"
    );
    ProbeOutcome::Skipped
}
