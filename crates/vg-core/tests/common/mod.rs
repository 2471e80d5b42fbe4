#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tokio::net::TcpListener;
use vg_core::config::ImageClientConfig;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn client_config(base: &str) -> ImageClientConfig {
    ImageClientConfig {
        api_key: Some("test-key".into()),
        api_base: format!("{base}/v1"),
        request_timeout: Duration::from_secs(5),
        download_timeout: Duration::from_secs(5),
        warmup_wait: Duration::from_millis(50),
        max_warmup_wait: Duration::from_secs(1),
        ..ImageClientConfig::default()
    }
}
