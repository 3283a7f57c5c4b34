// Headless Chromium snapshot capturer - scroll, screenshot, assemble a looping GIF
use crate::application::snapshot_capturer::SnapshotCapturer;
use crate::domain::error::PipelineError;
use crate::domain::tenant::Secret;
use crate::infrastructure::config::CaptureSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{Delay, Frame, RgbaImage};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The bits of a page the auto-scroller needs.
#[async_trait]
pub trait ScrollTarget: Send + Sync {
    async fn scroll_height(&self) -> Result<f64>;

    async fn scroll_by(&self, distance: u32) -> Result<()>;
}

#[async_trait]
impl ScrollTarget for Page {
    async fn scroll_height(&self) -> Result<f64> {
        let height = self
            .evaluate("document.body.scrollHeight")
            .await
            .context("Failed to read scroll height")?
            .into_value::<f64>()
            .context("Scroll height was not a number")?;
        Ok(height)
    }

    async fn scroll_by(&self, distance: u32) -> Result<()> {
        self.evaluate(format!("window.scrollBy(0, {})", distance))
            .await
            .context("Failed to scroll page")?;
        Ok(())
    }
}

/// Scrolls in fixed steps until the scrolled distance reaches the page's
/// current scroll height, re-reading the height after every step so lazily
/// loaded panels extend the walk. Returns the number of steps taken.
pub async fn auto_scroll(target: &dyn ScrollTarget, distance: u32, interval: Duration, max_steps: u32) -> Result<u32> {
    let mut scrolled = 0.0_f64;
    let mut steps = 0;

    while steps < max_steps {
        target.scroll_by(distance).await?;
        scrolled += f64::from(distance);
        steps += 1;
        tokio::time::sleep(interval).await;

        if scrolled >= target.scroll_height().await? {
            break;
        }
    }

    Ok(steps)
}

/// Waits for the navigated document's `networkIdle` lifecycle event. Events
/// before the new document's `init` belong to the previous page and are ignored.
pub async fn wait_for_network_idle<S>(events: S) -> Result<()>
where
    S: Stream<Item = String>,
{
    let mut events = std::pin::pin!(events);
    let mut navigated = false;

    while let Some(name) = events.next().await {
        match name.as_str() {
            "init" => navigated = true,
            "networkIdle" if navigated => return Ok(()),
            _ => {}
        }
    }
    anyhow::bail!("lifecycle events ended before the network went idle")
}

/// Decodes PNG screenshots, resizes them to the first frame's dimensions and
/// writes an infinitely looping GIF.
pub fn assemble_gif(screenshots: &[Vec<u8>], frame_delay: Duration, output: &Path) -> Result<()> {
    let mut frames: Vec<RgbaImage> = Vec::with_capacity(screenshots.len());
    for (i, png) in screenshots.iter().enumerate() {
        let decoded = image::load_from_memory(png).with_context(|| format!("Failed to decode frame {}", i))?;
        frames.push(decoded.to_rgba8());
    }

    let Some(first) = frames.first() else {
        anyhow::bail!("No frames captured");
    };
    let (width, height) = first.dimensions();

    let file = std::fs::File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder.set_repeat(Repeat::Infinite).context("Failed to set GIF looping")?;

    let delay_ms = u32::try_from(frame_delay.as_millis()).unwrap_or(u32::MAX);
    for frame in frames {
        let frame = if frame.dimensions() == (width, height) {
            frame
        } else {
            image::imageops::resize(&frame, width, height, FilterType::Triangle)
        };
        encoder
            .encode_frame(Frame::from_parts(frame, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1)))
            .context("Failed to encode GIF frame")?;
    }

    Ok(())
}

fn snapshot_file_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("dashboard_{}.gif", now.timestamp_millis())
}

#[derive(Debug, Clone)]
pub struct BrowserCapturer {
    settings: CaptureSettings,
}

impl BrowserCapturer {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    async fn screenshots(&self, url: &str, token: &Secret) -> Result<Vec<Vec<u8>>> {
        let s = &self.settings;
        let config = BrowserConfig::builder()
            .window_size(s.width, s.height)
            .viewport(Viewport { width: s.width, height: s.height, ..Viewport::default() })
            .no_sandbox()
            .request_timeout(s.navigation_timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser config: {}", e))?;

        let (mut browser, mut handler) = Browser::launch(config).await.context("Failed to launch headless browser")?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.drive(&browser, url, token).await;

        if let Err(e) = browser.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!("Browser exit wait failed: {}", e);
        }
        events.abort();

        result
    }

    async fn drive(&self, browser: &Browser, url: &str, token: &Secret) -> Result<Vec<Vec<u8>>> {
        let s = &self.settings;
        let page = browser.new_page("about:blank").await.context("Failed to open page")?;

        let headers = serde_json::json!({ "Authorization": format!("Bearer {}", token.expose()) });
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
            .await
            .context("Failed to set auth header")?;

        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .context("Failed to enable lifecycle events")?;
        let lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .context("Failed to subscribe to lifecycle events")?
            .map(|event| event.name.clone());

        page.goto(url).await.context("Navigation failed")?;
        tokio::time::timeout(s.navigation_timeout(), wait_for_network_idle(lifecycle))
            .await
            .map_err(|_| anyhow::anyhow!("network never went idle within {:?}", s.navigation_timeout()))??;

        let steps = auto_scroll(
            &page,
            s.scroll_distance,
            Duration::from_millis(s.scroll_interval_ms),
            s.max_scroll_steps,
        )
        .await?;
        tracing::debug!(steps, "Auto-scroll finished");
        page.evaluate("window.scrollTo(0, 0)").await.context("Failed to scroll back to top")?;

        let mut shots = Vec::with_capacity(s.frames as usize);
        for _ in 0..s.frames {
            let params = ScreenshotParams::builder().format(CaptureScreenshotFormat::Png).build();
            shots.push(page.screenshot(params).await.context("Screenshot failed")?);
            tokio::time::sleep(Duration::from_millis(s.frame_delay_ms)).await;
        }
        Ok(shots)
    }
}

#[async_trait]
impl SnapshotCapturer for BrowserCapturer {
    async fn capture(&self, dashboard_url: &str, auth_token: &Secret) -> Result<PathBuf, PipelineError> {
        let capture_error = |e: anyhow::Error| PipelineError::Capture(format!("{:#}", e));

        let shots = tokio::time::timeout(self.settings.navigation_timeout(), self.screenshots(dashboard_url, auth_token))
            .await
            .map_err(|_| PipelineError::Capture(format!("timed out after {:?}", self.settings.navigation_timeout())))?
            .map_err(capture_error)?;

        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(|e| PipelineError::Capture(format!("cannot create {}: {}", self.settings.output_dir.display(), e)))?;
        let output = self.settings.output_dir.join(snapshot_file_name(chrono::Utc::now()));

        let delay = Duration::from_millis(self.settings.frame_delay_ms);
        let target = output.clone();
        tokio::task::spawn_blocking(move || assemble_gif(&shots, delay, &target))
            .await
            .map_err(|e| PipelineError::Capture(e.to_string()))?
            .map_err(capture_error)?;

        tracing::info!(path = %output.display(), "Snapshot written");
        Ok(output)
    }
}
