//! detect_cam - live object detection from a camera, with saved snapshots

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use detect_cam::persistence::DetectionStore;
use detect_cam::ui::{stats_line, Ui, UiMode};
use detect_cam::{
    open_camera_source, AuthSession, Canvas, CameraController, DetectConfig, DetectionSession,
    HistoryClient, ModelLoader, PollOutcome, RenderSurface, SessionError,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE", global = true)]
    ui: UiMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run live detection until Ctrl-C or the frame limit.
    Run {
        /// Stop after this many iterations (0 runs until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        frames: u64,
        /// Save the last detections and snapshot to the detection store.
        #[arg(long)]
        save: bool,
        /// Write the last rendered canvas to this image file.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// List saved detections of the signed-in user.
    History,
    /// Refresh the saved history after confirmation.
    ClearHistory {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::for_terminal(args.ui);
    let cfg = {
        let _stage = ui.stage("Load configuration");
        DetectConfig::load()?
    };

    match args.command {
        Command::Run {
            frames,
            save,
            snapshot,
        } => run(&cfg, &ui, frames, save, snapshot),
        Command::History => history(&cfg, &ui),
        Command::ClearHistory { yes } => clear_history(&cfg, &ui, yes),
    }
}

fn run(cfg: &DetectConfig, ui: &Ui, frame_limit: u64, save: bool, snapshot: Option<PathBuf>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut canvas = Canvas::new();
    if let Some(font_path) = &cfg.font_path {
        canvas = canvas.with_font_file(font_path)?;
    }
    let camera = CameraController::new(
        open_camera_source(&cfg.camera.device)?,
        cfg.camera_constraints(),
    );
    let mut session = DetectionSession::new(ModelLoader::new(cfg.model_source()), camera, canvas);

    {
        let _stage = ui.stage("Load detection model");
        session.load_model(Instant::now())?;
    }
    {
        let _stage = ui.stage("Start camera");
        session.start_camera(Instant::now())?;
    }

    log::info!("detection running; press Ctrl-C to stop");
    let mut status = ui.live();
    let mut iterations = 0u64;
    while running.load(Ordering::SeqCst) && (frame_limit == 0 || iterations < frame_limit) {
        let Some(due) = session.next_due() else {
            log::warn!("detection loop has nothing scheduled; stopping");
            break;
        };
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        if let PollOutcome::Ran(_) = session.poll(Instant::now()) {
            iterations += 1;
            let state = session.state();
            status.update(state.object_count(), state.average_confidence());
        }
    }
    status.finish(&stats_line(
        session.state().object_count(),
        session.state().average_confidence(),
    ));

    if let Some(path) = &snapshot {
        let image = session
            .surface()
            .snapshot()
            .ok_or_else(|| anyhow!("no frame was rendered"))?;
        image
            .save(path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        println!("snapshot written to {}", path.display());
    }

    if save {
        match session.capture()? {
            Some(capture) => {
                let _stage = ui.stage("Save detections");
                let mut client = HistoryClient::new(cfg.open_store()?, cfg.auth_session());
                match client.save(capture) {
                    Ok(saved) => println!("saved {}", saved.summary()),
                    Err(err) => report_history_error(client.auth(), client.error(), &err),
                }
            }
            None => println!("{}", SessionError::NothingToSave),
        }
    }

    session.stop_camera();
    let stats = session.loop_stats();
    log::info!(
        "detection stopped: iterations={} frame_failures={} detect_failures={} render_failures={}",
        stats.iterations,
        stats.frame_failures,
        stats.detect_failures,
        stats.render_failures
    );
    Ok(())
}

fn history(cfg: &DetectConfig, ui: &Ui) -> Result<()> {
    let mut client = open_history(cfg)?;
    if !signed_in(client.auth()) {
        return Ok(());
    }
    let records = {
        let _stage = ui.stage("Fetch history");
        client.refresh()?
    };
    if records.is_empty() {
        println!("no saved detections");
    }
    for record in records {
        println!("{}", record.summary());
    }
    Ok(())
}

fn clear_history(cfg: &DetectConfig, ui: &Ui, yes: bool) -> Result<()> {
    let mut client = open_history(cfg)?;
    if !signed_in(client.auth()) {
        return Ok(());
    }
    let proceed = yes || confirm("Clear detection history?");
    if !proceed {
        println!("cancelled");
        return Ok(());
    }
    {
        let _stage = ui.stage("Refresh history");
        client.clear_history(|| proceed)?;
    }
    println!("{} saved detections", client.history().len());
    Ok(())
}

fn open_history(cfg: &DetectConfig) -> Result<HistoryClient<Box<dyn DetectionStore>>> {
    Ok(HistoryClient::new(cfg.open_store()?, cfg.auth_session()))
}

fn signed_in(auth: &AuthSession) -> bool {
    if auth.is_authenticated() {
        return true;
    }
    println!("{}: {}", SessionError::SignInRequired, auth.login_url());
    false
}

fn report_history_error(auth: &AuthSession, error: Option<SessionError>, err: &anyhow::Error) {
    log::debug!("history action failed: {:#}", err);
    match error {
        Some(SessionError::SignInRequired) => {
            eprintln!("{}: {}", SessionError::SignInRequired, auth.login_url())
        }
        Some(error) => eprintln!("{}", error),
        None => eprintln!("{:#}", err),
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
