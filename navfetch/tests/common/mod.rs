//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use navfetch::config::ConfigFile;
use navfetch::transport::{
    ResponseDisposition, ResponseHead, TransferHandle, Transport, TransportEvents,
    TransportRequest,
};

/// How [`ScriptedTransport`] answers a URL.
#[derive(Clone)]
pub enum Route {
    Body(Vec<u8>),
    Status(u16),
}

/// Transport answering from a URL table.
///
/// While held, transfers are accepted but not answered until released.
/// Unknown URLs get a 404.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
    gate: watch::Sender<bool>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            gate,
        })
    }

    pub fn route(&self, url: &str, route: Route) {
        self.routes.lock().insert(url.to_string(), route);
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }
}

impl Transport for ScriptedTransport {
    fn begin(&self, request: TransportRequest, events: Arc<dyn TransportEvents>) -> TransferHandle {
        self.requests.lock().push(request.url().to_string());
        let route = self
            .routes
            .lock()
            .get(request.url())
            .cloned()
            .unwrap_or(Route::Status(404));
        let mut gate = self.gate.subscribe();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let key = request.key.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => return,
                opened = async { gate.wait_for(|open| *open).await.is_ok() } => {
                    if !opened {
                        return;
                    }
                }
            }
            if cancelled.is_cancelled() {
                return;
            }
            let (status, body) = match route {
                Route::Body(body) => (200, Some(body)),
                Route::Status(status) => (status, None),
            };
            if events.did_receive_response(&key, ResponseHead::new(status))
                == ResponseDisposition::Cancel
            {
                return;
            }
            if let Some(body) = body {
                events.did_receive_data(&key, Bytes::from(body));
            }
            events.did_complete(&key, None);
        });

        TransferHandle::new(token)
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// PNG of `width`×`height` filled with `color`.
pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    encode(&image)
}

pub fn encode(image: &RgbaImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

/// Defaults with cache and log paths inside `dir`.
pub fn config_in(dir: &std::path::Path) -> ConfigFile {
    let mut config = ConfigFile::default();
    config.cache.directory = dir.join("cache");
    config.logging.file = dir.join("navfetch.log");
    config.download.max_concurrent = 8;
    config
}
