use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::SubCommandExtend;
use crate::config::{Opts, PipelineOptions};
use crate::server;

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub pipeline: PipelineOptions,
    /// 监听地址
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// 监听端口
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// 单次请求的最大字节数
    #[arg(long, value_name = "BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_upload_size: usize,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH", value_parser = parse_auth)]
    pub prometheus_auth: Option<(String, String)>,
}

impl ServerCommand {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = self.pipeline.build_pipeline()?;
        info!("原图目录: {}", self.pipeline.upload_dir.display());
        info!("缩放图目录: {}", self.pipeline.resized_dir.display());

        // 创建应用状态
        let state = Arc::new(server::AppState::new(pipeline, opts.debug));

        // 创建应用
        let app = server::create_app(state, self.max_upload_size);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr());
            let auth = self.prometheus_auth.clone();
            tokio::spawn(async move {
                loop {
                    let metric_families = prometheus::gather();
                    let url = url.clone();
                    let instance = instance.clone();
                    let auth = auth.clone();
                    let r = spawn_blocking(move || {
                        prometheus::push_metrics(
                            "hotdog",
                            labels! {
                                "instance".to_string() => instance,
                            },
                            &url,
                            metric_families,
                            auth.map(|(username, password)| BasicAuthentication {
                                username,
                                password,
                            }),
                        )
                    })
                    .await;
                    match r {
                        Ok(Err(e)) => error!("推送指标失败: {e}"),
                        Err(e) => error!("推送指标任务异常退出: {e}"),
                        Ok(Ok(())) => {}
                    }
                    sleep(Duration::from_secs(30)).await;
                }
            });
        }

        // 启动服务器
        let addr = self.addr();
        info!("服务器启动：http://{}", addr);
        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

fn parse_auth(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(username, password)| (username.to_string(), password.to_string()))
        .ok_or_else(|| format!("无效的认证信息: {}", s))
}
