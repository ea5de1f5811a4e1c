use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use sensor_dashboard::chart::format::format_tooltip_time;
use sensor_dashboard::chart::{ChartRenderer, DashboardView, DisplayWindow, ViewSettings};
use sensor_dashboard::client::DashboardClient;
use sensor_dashboard::config::DashboardConfig;
use sensor_dashboard::field::Field;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::Instant;

const INDEX_FILE: &str = "index.html";

#[derive(Parser, Debug)]
#[command(
    about = "Polls a running sensor dashboard and writes one SVG chart per field plus an index page, refreshing on an interval."
)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,
    #[arg(long, default_value = "snapshots")]
    out_dir: PathBuf,
    #[arg(long, default_value = "24h", value_parser = parse_window)]
    window: DisplayWindow,
    #[arg(long, default_value_t = 800)]
    width: u32,
    #[arg(long, default_value_t = 400)]
    height: u32,
    /// Overrides DASHBOARD_REFRESH_INTERVAL_SECONDS.
    #[arg(long)]
    refresh_seconds: Option<u64>,
    /// Read `WIDTHxHEIGHT` lines from stdin and re-render once the size settles.
    #[arg(long, default_value_t = false)]
    resize_from_stdin: bool,
    /// Fetch and render a single time, then exit.
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn parse_window(raw: &str) -> Result<DisplayWindow, String> {
    raw.parse::<DisplayWindow>().map_err(|err| err.to_string())
}

fn view_settings(configured: ViewSettings, refresh_seconds: Option<u64>) -> ViewSettings {
    match refresh_seconds {
        Some(secs) => ViewSettings {
            refresh_interval: Duration::from_secs(secs.max(1)),
            ..configured
        },
        None => configured,
    }
}

fn parse_size(line: &str) -> Option<(u32, u32)> {
    let (width, height) = line.trim().split_once(['x', 'X'])?;
    let width = width.trim().parse::<u32>().ok().filter(|w| *w > 0)?;
    let height = height.trim().parse::<u32>().ok().filter(|h| *h > 0)?;
    Some((width, height))
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn chart_title(field: Field, window: DisplayWindow) -> String {
    format!("{} ({}) · {}", field.label(), field.unit(), window.label())
}

fn index_page(view: &DashboardView, window: DisplayWindow) -> String {
    let mut body = String::new();
    for field in Field::ALL {
        body.push_str(&format!(
            "<figure><figcaption>{}</figcaption><img src=\"{}.svg\" alt=\"{}\"></figure>\n",
            escape_html(&chart_title(field, window)),
            field.as_str(),
            field.label(),
        ));
    }
    let updated = view
        .last_update()
        .map(format_tooltip_time)
        .unwrap_or_else(|| "never".to_string());
    let banner = view
        .error_banner()
        .map(|err| format!("<p class=\"error\">{}</p>\n", escape_html(err)))
        .unwrap_or_default();
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Sensor dashboard · {}</title></head>\n<body>\n<h1>{}</h1>\n{banner}<p>Last updated {}</p>\n{body}</body>\n</html>\n",
        window.label(),
        window.label(),
        escape_html(&updated),
    )
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Writes the charts that are due plus the index page.
fn render(
    view: &mut DashboardView,
    renderer: &ChartRenderer,
    window: DisplayWindow,
    out_dir: &Path,
    now: DateTime<Utc>,
) -> Result<()> {
    let charts = view
        .render_due(renderer, now, Instant::now())
        .context("failed to render charts")?;
    if charts.is_empty() {
        return Ok(());
    }
    for (field, svg) in &charts {
        write_file(&out_dir.join(format!("{}.svg", field.as_str())), svg)?;
    }
    write_file(&out_dir.join(INDEX_FILE), &index_page(view, window))?;
    tracing::debug!(charts = charts.len(), "wrote snapshots");
    Ok(())
}

async fn refresh(client: &DashboardClient, view: &mut DashboardView, window: DisplayWindow) {
    view.begin_fetch();
    match client.fetch_bundle(window).await {
        Ok(bundle) => {
            view.apply_bundle(&bundle);
            tracing::info!(
                samples = bundle.flatten().len(),
                errors = bundle.errors.len(),
                "refreshed sensor data"
            );
        }
        Err(err) => {
            tracing::warn!("failed to fetch sensor data: {err}");
            view.apply_error(err.to_string());
        }
    }
}

type SizeLines = Lines<BufReader<Stdin>>;

/// Next line from stdin, or never once stdin is closed.
async fn next_line(input: &mut Option<SizeLines>) -> Option<String> {
    let Some(lines) = input.as_mut() else {
        return std::future::pending().await;
    };
    match lines.next_line().await {
        Ok(Some(line)) => Some(line),
        Ok(None) => {
            *input = None;
            None
        }
        Err(err) => {
            tracing::warn!("stopped reading sizes from stdin: {err}");
            *input = None;
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let config = DashboardConfig::from_env(None)?;
    let settings = view_settings(config.view, args.refresh_seconds);
    tracing::info!(
        refresh_interval = ?settings.refresh_interval,
        resize_debounce = ?settings.resize_debounce,
        "starting dashboard snapshots"
    );

    let client = DashboardClient::new(&args.url).context("invalid --url")?;
    let mut view = DashboardView::new((args.width, args.height), settings);
    view.set_window(args.window);
    let renderer = ChartRenderer::default();

    if args.once {
        refresh(&client, &mut view, args.window).await;
        return render(&mut view, &renderer, args.window, &args.out_dir, Utc::now());
    }

    let mut sizes: Option<SizeLines> = args
        .resize_from_stdin
        .then(|| BufReader::new(tokio::io::stdin()).lines());
    let mut ticker = tokio::time::interval(settings.refresh_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        let settle = view.resize_deadline();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                refresh(&client, &mut view, args.window).await;
            }
            line = next_line(&mut sizes) => {
                match line.as_deref().map(parse_size) {
                    Some(Some(size)) => view.resize(size, Instant::now()),
                    Some(None) => tracing::warn!("ignoring size line; expected WIDTHxHEIGHT"),
                    None => {}
                }
            }
            _ = tokio::time::sleep_until(settle.unwrap_or_else(Instant::now)), if settle.is_some() => {}
        }
        render(&mut view, &renderer, args.window, &args.out_dir, Utc::now())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_refresh_overrides_configured_interval() {
        let configured = ViewSettings {
            refresh_interval: Duration::from_secs(45),
            resize_debounce: Duration::from_millis(250),
        };
        assert_eq!(view_settings(configured, None), configured);

        let settings = view_settings(configured, Some(5));
        assert_eq!(settings.refresh_interval, Duration::from_secs(5));
        assert_eq!(settings.resize_debounce, Duration::from_millis(250));
        assert_eq!(
            view_settings(configured, Some(0)).refresh_interval,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn size_lines_parse_width_by_height() {
        assert_eq!(parse_size("640x480"), Some((640, 480)));
        assert_eq!(parse_size(" 1024 X 768 \n"), Some((1024, 768)));
        assert_eq!(parse_size("0x480"), None);
        assert_eq!(parse_size("wide"), None);
    }

    #[test]
    fn index_page_titles_each_chart() {
        let mut view = DashboardView::new((800, 400), ViewSettings::default());
        view.apply_error("store <unreachable>");
        let page = index_page(&view, DisplayWindow::SixHours);
        assert!(page.contains("<h1>Last 6 hours</h1>"));
        assert!(page.contains("Temperature (°C) · Last 6 hours"));
        assert!(page.contains("<img src=\"pressure.svg\""));
        assert!(page.contains("store &lt;unreachable&gt;"));
        assert!(page.contains("Last updated never"));
    }

    #[test]
    fn render_writes_due_charts_and_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut view = DashboardView::new((400, 200), ViewSettings::default());
        let renderer = ChartRenderer::default();
        render(&mut view, &renderer, DisplayWindow::OneHour, dir.path(), Utc::now())?;
        for field in Field::ALL {
            let svg = std::fs::read_to_string(dir.path().join(format!("{}.svg", field.as_str())))?;
            assert!(svg.contains("No data available"));
        }
        assert!(dir.path().join(INDEX_FILE).exists());

        std::fs::remove_file(dir.path().join(INDEX_FILE))?;
        render(&mut view, &renderer, DisplayWindow::OneHour, dir.path(), Utc::now())?;
        assert!(!dir.path().join(INDEX_FILE).exists());
        Ok(())
    }
}
