//! DICOM标注终端程序

mod command;

use anyhow::{Context, Result};
use clap::Parser;
use command::{Command, HELP};
use labeler_admin::{init_logging, ConfigManager};
use labeler_core::RemoteGateway;
use labeler_integration::{HttpGateway, HttpGatewayConfig, InMemoryGateway};
use labeler_workflow::{
    ApplyOutcome, ControllerSettings, LabelingController, Navigation, StatusKind, UndoOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{error, info};

/// 标注终端命令行参数
#[derive(Parser, Debug)]
#[command(name = "labeler-cli")]
#[command(about = "DICOM 检查标注终端")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 后端地址，覆盖配置文件
    #[arg(short, long)]
    base_url: Option<String>,

    /// 用户名
    #[arg(short, long)]
    user: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,

    /// 使用内置演示数据，不连接后端
    #[arg(long)]
    demo: bool,

    /// 把生效的配置写入文件后退出
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::new(args.config.as_deref())?;
    let mut config = manager.get_config().await;
    if let Some(base_url) = args.base_url {
        config.gateway.base_url = base_url;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(user) = args.user {
        config.gateway.user = Some(user);
    }
    manager.update_config(config.clone()).await?;
    init_logging(&config.logging)?;

    if let Some(path) = args.write_config {
        manager.save_config(&path).await?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let user = config
        .gateway
        .user
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let gateway: Arc<dyn RemoteGateway> = if args.demo {
        info!("Using built-in demo data");
        Arc::new(demo_gateway())
    } else {
        info!("Connecting to {}", config.gateway.base_url);
        Arc::new(
            HttpGateway::new(HttpGatewayConfig {
                base_url: config.gateway.base_url.clone(),
                request_timeout: config.gateway.request_timeout(),
            })
            .context("Failed to create HTTP gateway")?,
        )
    };

    let settings = ControllerSettings {
        settle_delay: config.workflow.settle_delay(),
        status_ttl: config.workflow.status_display(),
    };
    let mut controller = LabelingController::new(gateway, user, settings);

    if let Err(e) = controller.load_session().await {
        if controller.store().is_empty() {
            return Err(e).context("Failed to load labeling session");
        }
        error!("Session loaded but the first patient could not be displayed: {}", e);
    }

    println!("{}", HELP);
    render(&controller);
    run(&mut controller).await?;

    if controller.flush_writes().await > 0 {
        render_status(&controller);
    }
    info!("Labeling session {} finished", controller.session_id());
    Ok(())
}

/// 交互主循环: 同时等待输入、确认延迟和后台写入结果
async fn run(controller: &mut LabelingController) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let deadline = controller.settle_deadline();

        tokio::select! {
            _ = settle_timer(deadline) => {
                report(controller.on_settle_elapsed().await);
                render(controller);
            }
            failed = controller.next_write_outcome() => {
                if failed {
                    render_status(controller);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };

                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        execute(controller, command).await;
                        render(controller);
                    }
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    Ok(())
}

async fn settle_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn execute(controller: &mut LabelingController, command: Command) {
    match command {
        Command::Label(label) => match controller.apply_label(label) {
            Ok(ApplyOutcome::Applied(action)) => {
                println!("{} -> {}", action.study_id, action.new_label)
            }
            Ok(ApplyOutcome::Ignored) => {}
            Err(e) => println!("{}", e),
        },
        Command::Undo => match controller.undo().await {
            Ok(UndoOutcome::Reverted { action, fast }) => {
                let how = if fast { "immediately" } else { "from history" };
                println!("Undid {} {}", action.study_id, how);
            }
            Ok(UndoOutcome::Nothing) => println!("Nothing to undo"),
            Err(e) => println!("{}", e),
        },
        Command::SelectPatient(patient) => report(controller.select_patient(&patient).await),
        Command::SelectStudy(study) => {
            let patient = controller.selection().map(|s| s.patient_id.clone());
            match patient {
                Some(patient) => report(controller.select_study(&patient, &study).await),
                None => println!("No patient displayed"),
            }
        }
        Command::PatientAt(position) => report(controller.select_patient_at(position).await),
        Command::StudyAt(position) => report(controller.select_study_at(position).await),
        Command::Export(path) => match controller.export_csv(&path) {
            Ok(rows) => println!("Exported {} labels to {}", rows, path.display()),
            Err(e) => println!("Export failed: {}", e),
        },
        Command::ResetAll => report(controller.reset_all_labels().await),
        Command::StartOver => {
            let outcome = controller.start_over().await;
            if outcome.remote_error.is_none() {
                println!("All data deleted");
            }
        }
        Command::Logout => controller.logout(),
        Command::Progress => print_progress(controller),
        Command::Dismiss => {
            controller.dismiss_status();
            controller.dismiss_completion();
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

fn report(result: labeler_core::Result<Navigation>) {
    match result {
        Ok(Navigation::Patient(item)) => println!("Now on patient {}", item.patient_id),
        Ok(Navigation::Study(_)) | Ok(Navigation::Stayed) => {}
        Err(e) => println!("{}", e),
    }
}

fn render(controller: &LabelingController) {
    if let Some(notice) = controller.completion_notice() {
        println!("*** All {} studies are labeled ***", notice.total);
    }
    render_status(controller);

    let (Some(patient), Some(study)) = (controller.displayed_patient(), controller.displayed_study()) else {
        println!("Nothing to display ({} studies)", controller.total_count());
        return;
    };

    let position = patient.study_position(&study.study_id).map_or(0, |i| i + 1);
    let frames = study
        .frames
        .as_ref()
        .map_or(study.frame_count as usize, Vec::len);
    println!(
        "{} | study {}/{} {} | label {} | {} frames | {}/{} labeled",
        patient.patient_id,
        position,
        patient.studies.len(),
        study.study_id,
        study.label,
        frames,
        controller.labeled_count(),
        controller.total_count()
    );
}

fn render_status(controller: &LabelingController) {
    if let Some(status) = controller.status() {
        let tag = match status.kind {
            StatusKind::Success => "ok",
            StatusKind::Warning => "warning",
            StatusKind::Error => "error",
        };
        println!("[{}] {}", tag, status.text);
    }
}

fn print_progress(controller: &LabelingController) {
    let progress = controller.progress();
    for (i, patient) in progress.patients.iter().enumerate() {
        let mark = if patient.fully_labeled { "✓" } else { " " };
        println!(
            "{:>3}. {} {} ({}/{})",
            i + 1,
            mark,
            patient.patient_id,
            patient.labeled,
            patient.total
        );
    }
    println!(
        "{}/{} labeled, {} queued",
        progress.labeled, progress.total, progress.queued
    );
}

fn demo_gateway() -> InMemoryGateway {
    InMemoryGateway::new()
        .with_patient("patient_1", &[("a.dcm", 0), ("b.dcm", 0), ("c.dcm", 2)])
        .with_patient("patient_2", &[("d.dcm", 0), ("e.dcm", 0)])
        .with_patient("patient_10", &[("f.dcm", 4)])
        .with_patient("patient_3", &[("g.dcm", 0)])
}
