//! Interactive page loop: landing → login → gallery over stdin/stdout.

use crate::capture::{spawn_capture, CaptureError, CaptureHandle, CaptureSettings, StillImage, StillSource};
use crate::config::Config;
use crate::gallery::{render_grid, render_preview, GalleryCommand, GalleryPage};
use crate::landing;
use crate::login::{LoginFlow, LoginOutcome, ViewLifetime};
use facefind_api::MatchApi;
use facefind_core::{match_store, GalleryView, MatchReader, Route, ScrfdDetector};
use facefind_hw::Camera;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

const LOGIN_HELP: &str = "Enter: log in   g: gallery   h: home   q: quit";

/// Where the loop goes after a page returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Go(Route),
    Quit,
}

/// One interactive run of the app.
pub struct Session<A, R> {
    config: Config,
    login: LoginFlow<A>,
    reader: MatchReader,
    input: Lines<R>,
}

impl<A, R> Session<A, R>
where
    A: MatchApi,
    R: AsyncBufRead + Unpin,
{
    pub fn new(config: Config, login: LoginFlow<A>, reader: MatchReader, input: R) -> Self {
        Self {
            config,
            login,
            reader,
            input: input.lines(),
        }
    }

    /// Run pages until the user quits or input ends.
    pub async fn run(&mut self, start: Route) -> anyhow::Result<()> {
        let mut route = start;
        loop {
            let resolved = route.resolve(&self.reader);
            if resolved != route {
                tracing::info!(from = %route, to = %resolved, "redirecting");
            }
            tracing::debug!(route = %resolved, "entering page");

            let next = match resolved {
                Route::Landing => self.landing_page().await?,
                Route::Login => self.login_page().await?,
                Route::Gallery => self.gallery_page().await?,
            };
            match next {
                Next::Go(to) => route = to,
                Next::Quit => return Ok(()),
            }
        }
    }

    async fn landing_page(&mut self) -> anyhow::Result<Next> {
        println!("{}", landing::render());
        loop {
            let Some(line) = self.input.next_line().await? else {
                return Ok(Next::Quit);
            };
            match line.trim() {
                "" | "l" | "login" => return Ok(Next::Go(Route::Login)),
                "q" | "quit" => return Ok(Next::Quit),
                other => println!("Unknown command: {other}"),
            }
        }
    }

    async fn login_page(&mut self) -> anyhow::Result<Next> {
        let mut capture = start_capture(&self.config)?;
        let view = ViewLifetime::mounted();

        let next = self.login_loop(&capture, &view).await;

        view.end();
        // Joining the capture thread blocks; keep it off the runtime workers.
        if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
            tracing::error!(error = %e, "camera release task failed");
        }
        next
    }

    async fn login_loop(&mut self, capture: &CaptureHandle, view: &ViewLifetime) -> anyhow::Result<Next> {
        let mut readiness = capture.readiness();
        let mut ready = *readiness.borrow_and_update();
        let mut camera_alive = true;

        println!("Take your selfie");
        println!("{}", readiness_line(ready));
        println!("{LOGIN_HELP}");

        loop {
            tokio::select! {
                changed = readiness.changed(), if camera_alive => {
                    match changed {
                        Ok(()) => {
                            let now = *readiness.borrow_and_update();
                            if now != ready {
                                ready = now;
                                println!("{}", readiness_line(ready));
                            }
                        }
                        Err(_) => {
                            camera_alive = false;
                            println!("Camera unavailable. Login stays disabled.");
                        }
                    }
                }
                line = self.input.next_line() => {
                    let Some(line) = line? else {
                        return Ok(Next::Quit);
                    };
                    match line.trim() {
                        "" => {
                            let outcome = self.submit(capture, view).await?;
                            if let Some(notice) = outcome.notice() {
                                println!("{notice}");
                            }
                            if outcome.next_route() != Route::Login {
                                return Ok(Next::Go(outcome.next_route()));
                            }
                        }
                        "g" | "gallery" => return Ok(Next::Go(Route::Gallery)),
                        "h" | "home" => return Ok(Next::Go(Route::Landing)),
                        "q" | "quit" => return Ok(Next::Quit),
                        other => {
                            println!("Unknown command: {other}");
                            println!("{LOGIN_HELP}");
                        }
                    }
                }
            }
        }
    }

    /// Submit once, answering any input typed meanwhile with the busy notice.
    async fn submit<S: StillSource>(&mut self, source: &S, view: &ViewLifetime) -> anyhow::Result<LoginOutcome> {
        let login = &self.login;
        let input = &mut self.input;
        let mut input_open = true;

        if source.is_ready() {
            println!("Matching your selfie...");
        }
        let pending = login.submit(source, view);
        tokio::pin!(pending);

        loop {
            // `pending` goes first so the in-flight guard is taken before any input is read.
            tokio::select! {
                biased;
                outcome = &mut pending => return Ok(outcome),
                line = input.next_line(), if input_open => {
                    match line? {
                        Some(_) => {
                            tracing::debug!(in_flight = login.is_busy(), "input while matching");
                            if let Some(notice) = login.submit(source, view).await.notice() {
                                println!("{notice}");
                            }
                        }
                        None => input_open = false,
                    }
                }
            }
        }
    }

    async fn gallery_page(&mut self) -> anyhow::Result<Next> {
        let mut page = match GalleryPage::enter(self.reader.clone()) {
            Ok(page) => page,
            Err(route) => return Ok(Next::Go(route)),
        };
        println!("{}", page.render());

        loop {
            let Some(line) = self.input.next_line().await? else {
                return Ok(Next::Quit);
            };
            if page.sync() {
                println!("{}", page.render());
            }

            match GalleryCommand::parse(&line) {
                Some(GalleryCommand::Open(position)) => match page.view_mut().open(position) {
                    Ok(item) => {
                        let item = item.clone();
                        println!("{}", render_preview(position, &item));
                        if self.config.open_previews {
                            if let Err(e) = open::that_detached(&item.photo_url) {
                                tracing::warn!(url = %item.photo_url, error = %e, "could not open preview");
                            }
                        }
                    }
                    Err(e) => println!("{e}"),
                },
                Some(GalleryCommand::Close) => {
                    page.view_mut().close();
                    println!("{}", page.render());
                }
                Some(GalleryCommand::Redraw) => {
                    println!("{}", page.render());
                    if let Some(item) = page.view().preview() {
                        println!("Previewing {}", item.photo_url);
                    }
                }
                Some(GalleryCommand::Back) => return Ok(Next::Go(Route::Login)),
                Some(GalleryCommand::Quit) => return Ok(Next::Quit),
                None => println!("Unknown command: {}", line.trim()),
            }
        }
    }
}

fn readiness_line(ready: bool) -> &'static str {
    if ready {
        "Face detected. Press Enter to log in."
    } else {
        "Position exactly one face in the frame. Login is disabled."
    }
}

fn start_capture(config: &Config) -> Result<CaptureHandle, CaptureError> {
    let device = config.camera_device.clone();
    let (width, height) = (config.frame_width, config.frame_height);
    let model_dir = config.model_dir.clone();

    spawn_capture(
        move || Camera::open(&device, width, height),
        move || ScrfdDetector::load(&model_dir),
        CaptureSettings {
            interval: config.detect_interval,
            warmup_frames: config.warmup_frames,
        },
    )
}

/// Match a photo from disk without the camera; prints the sorted results.
pub async fn match_still<A: MatchApi>(config: &Config, api: A, path: &Path) -> anyhow::Result<LoginOutcome> {
    let still = StillImage::open(path)?;
    let (writer, reader) = match_store();
    let login = LoginFlow::new(api, writer, config.jpeg_quality);

    let outcome = login.submit(&still, &ViewLifetime::mounted()).await;
    if let Some(notice) = outcome.notice() {
        println!("{notice}");
    }
    if let Some(data) = reader.get() {
        println!("{}", render_grid(&GalleryView::new(data)));
    }
    Ok(outcome)
}

/// Open the camera and detector, and report whether a single face shows up.
pub async fn check(config: &Config, wait: Duration) -> anyhow::Result<bool> {
    println!("Camera:  {}", config.camera_device);
    println!("Models:  {}", config.model_dir.display());

    let mut capture = start_capture(config)?;
    let mut readiness = capture.readiness();
    let ready = match tokio::time::timeout(wait, readiness.wait_for(|ready| *ready)).await {
        Ok(Ok(_)) => true,
        Ok(Err(_)) => {
            println!("Capture stopped: camera or face detector unavailable (see log).");
            false
        }
        Err(_) => false,
    };
    capture.stop();

    println!("Face ready: {}", if ready { "yes" } else { "no" });
    Ok(ready)
}
