//! modpack-sync CLI
//!
//! ## 사용법
//! ```text
//! modpack-sync check                    # 업데이트 확인 (변경 없음)
//! modpack-sync check --json             # JSON 출력
//! modpack-sync update                   # 계획 전체 실행 (Ctrl+C로 취소)
//! modpack-sync status                   # 설치 버전, 경로, 런처 프로필
//! modpack-sync config                   # 설정 표시
//! modpack-sync config --json            # 설정 JSON 출력
//! modpack-sync config set <key> <value> # 설정 변경
//! modpack-sync help                     # 도움말
//! ```
//!
//! ## 종료 코드
//! - `0`: 업데이트 있음(check) / 성공(update)
//! - `1`: 에러
//! - `2`: 업데이트 없음 (최신 상태, check)
//! - `130`: 취소됨 (update)

use modpack_updater_lib::{
    CancellationFlag, CheckReport, EngineConfig, EngineEvent, EventSink, InstallStep,
    InstalledState, ProfileRegistrar, RunOutcome, UpdateEngine, UpdateWorker,
};

use crate::config::{config_file_path, load_config, set_config_value, SETTABLE_KEYS};

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_UP_TO_DATE: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

/// CLI 실행: 프로그램 이름 이후의 인자를 받아 종료 코드 반환
pub fn run_cli(args: Vec<String>) -> i32 {
    // stderr로 출력하여 stdout의 JSON을 오염시키지 않음
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create tokio runtime: {}", e);
            return EXIT_ERROR;
        }
    };

    rt.block_on(async move {
        match run_cli_async(args).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("✗ Error: {:#}", e);
                EXIT_ERROR
            }
        }
    })
}

pub async fn run_cli_async(args: Vec<String>) -> anyhow::Result<i32> {
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    if args_ref.is_empty() || matches!(args_ref[0], "help" | "--help" | "-h") {
        print_help();
        return Ok(EXIT_OK);
    }

    if matches!(args_ref[0], "--version" | "-V") {
        println!("modpack-sync {}", env!("CARGO_PKG_VERSION"));
        return Ok(EXIT_OK);
    }

    match args_ref[0] {
        "check" => cmd_check(load_config()?, &args_ref[1..]).await,
        "update" => cmd_update(load_config()?).await,
        "status" => cmd_status(load_config()?),
        "config" => cmd_config(&args_ref[1..]),
        other => {
            eprintln!("✗ Unknown command: {}", other);
            eprintln!("  Run 'modpack-sync help' for usage.");
            Ok(EXIT_ERROR)
        }
    }
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

pub async fn cmd_check(cfg: EngineConfig, flags: &[&str]) -> anyhow::Result<i32> {
    let json_mode = flags.contains(&"--json");
    let engine = UpdateEngine::new(cfg, EventSink::detached(), CancellationFlag::new());

    let report = match engine.check().await {
        Ok(report) => report,
        Err(e) => {
            if json_mode {
                let json = serde_json::json!({ "error": e.to_string(), "code": e.error_code() });
                println!("{}", json);
            } else {
                eprintln!("✗ Check failed: {}", e);
            }
            return Ok(EXIT_ERROR);
        }
    };

    if json_mode {
        println!("{}", check_report_json(&report));
    } else {
        println!("📋 Modpack status");
        println!("─────────────────────────────────────────────");
        println!(
            "  Installed: {}",
            report.installed.as_deref().unwrap_or("(not installed)")
        );
        println!("  Latest:    {}", report.latest);
        println!();
        if report.updates_available() {
            println!("  {} step(s) pending:", report.plan.len());
            for (idx, step) in report.plan.steps.iter().enumerate() {
                println!("    {}. {}", idx + 1, step.label());
            }
            println!();
            println!("  Run 'modpack-sync update' to install.");
        } else {
            println!("  ✓ Up to date");
        }
    }

    Ok(if report.updates_available() {
        EXIT_OK
    } else {
        EXIT_UP_TO_DATE
    })
}

pub async fn cmd_update(cfg: EngineConfig) -> anyhow::Result<i32> {
    let mut worker = UpdateWorker::spawn(cfg);

    let cancel = worker.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⚠ Cancellation requested, stopping after the current chunk...");
            cancel.cancel();
        }
    });

    let mut last_decile = None;
    while let Some(event) = worker.next_event().await {
        match event {
            EngineEvent::Log(line) => {
                last_decile = None;
                println!("  {}", line);
            }
            EngineEvent::Progress(percent) => {
                let decile = percent / 10;
                if last_decile != Some(decile) {
                    last_decile = Some(decile);
                    println!("    … {}%", percent);
                }
            }
            EngineEvent::Finished(outcome) => {
                let mark = if outcome.is_success() { "✓" } else { "✗" };
                println!("{} {}", mark, outcome.summary());
            }
        }
    }

    let outcome = worker.join().await;
    ctrl_c.abort();
    Ok(exit_code(&outcome))
}

pub fn cmd_status(cfg: EngineConfig) -> anyhow::Result<i32> {
    let installed = InstalledState::in_pack_root(&cfg.pack_dir).read()?;
    let roots = cfg.install_roots();
    let store = cfg.profile_store_path();

    println!("📋 Modpack installation");
    println!("─────────────────────────────────────────────");
    println!(
        "  Installed version: {}",
        installed.as_deref().unwrap_or("(not installed)")
    );
    println!("  Pack dir:          {}", roots.pack_root.display());
    println!("  Versions dir:      {}", roots.version_store_root.display());
    println!("  Libraries dir:     {}", roots.libraries_root.display());
    println!("  Profile store:     {}", store.display());
    println!();

    match ProfileRegistrar::new(&store).read_record(&cfg.profile.id) {
        Some(record) => {
            println!("  Launcher profile '{}':", cfg.profile.id);
            let pretty = serde_json::to_string_pretty(&record)?;
            for line in pretty.lines() {
                println!("    {}", line);
            }
        }
        None => println!("  Launcher profile '{}': (not registered)", cfg.profile.id),
    }
    Ok(EXIT_OK)
}

fn cmd_config(args: &[&str]) -> anyhow::Result<i32> {
    match args.first().copied() {
        Some("set") if args.len() >= 3 => {
            let key = args[1];
            let value = args[2..].join(" ");
            let path = set_config_value(key, &value)?;
            println!("✓ {} = {}", key, value);
            println!("  Saved to {}", path.display());
        }
        Some("set") => {
            eprintln!("Usage: modpack-sync config set <key> <value>");
            eprintln!("Keys: {}", SETTABLE_KEYS.join(", "));
            return Ok(EXIT_ERROR);
        }
        Some("--json") => {
            let cfg = load_config()?;
            println!("{}", serde_json::to_string(&cfg)?);
        }
        _ => {
            let cfg = load_config()?;
            println!("📋 modpack-sync Configuration");
            println!("─────────────────────────────────────────────");
            println!("  manifest_url:    {}", cfg.manifest_url);
            println!("  pack_dir:        {}", cfg.pack_dir.display());
            println!("  game_dir:        {}", cfg.game_dir.display());
            let roots = cfg.install_roots();
            println!("  versions_dir:    {}", roots.version_store_root.display());
            println!("  libraries_dir:   {}", roots.libraries_root.display());
            println!("  profile_store:   {}", cfg.profile_store_path().display());
            println!("  memory_gb:       {}", cfg.memory_gb);
            println!("  patch_ordering:  {:?}", cfg.patch_ordering);
            println!(
                "  download:        {} attempts, {}s timeout, {}ms delay",
                cfg.download.max_attempts, cfg.download.timeout_secs, cfg.download.retry_delay_ms
            );
            println!("  profile:         {} ({})", cfg.profile.name, cfg.profile.id);
            println!();
            println!("  Config file: {}", config_file_path().display());
            println!();
            println!("  Change with: modpack-sync config set <key> <value>");
        }
    }
    Ok(EXIT_OK)
}

// ═══════════════════════════════════════════════════════
// 유틸리티
// ═══════════════════════════════════════════════════════

/// 실행 결과 → 종료 코드
pub fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::UpToDate { .. } | RunOutcome::Completed { .. } => EXIT_OK,
        RunOutcome::Failed { .. } => EXIT_ERROR,
        RunOutcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}

pub fn check_report_json(report: &CheckReport) -> serde_json::Value {
    let steps: Vec<serde_json::Value> = report
        .plan
        .steps
        .iter()
        .map(|step| match step {
            InstallStep::InstallFull(p) => serde_json::json!({
                "kind": "full",
                "version": p.version,
                "filename": p.filename,
            }),
            InstallStep::ApplyPatch { key, package } => serde_json::json!({
                "kind": "patch",
                "key": key,
                "version": package.version,
                "filename": package.filename,
            }),
        })
        .collect();

    serde_json::json!({
        "installed": report.installed,
        "latest": report.latest,
        "updates_available": report.updates_available(),
        "steps": steps,
    })
}

fn print_help() {
    println!("modpack-sync — keeps a local modpack in sync with its published manifest");
    println!();
    println!("USAGE:");
    println!("  modpack-sync <command> [args...]");
    println!();
    println!("COMMANDS:");
    println!("  check                       Check for available updates (no changes)");
    println!("  check --json                Check and output JSON");
    println!("  update                      Download and install pending updates");
    println!("  status                      Show installed version, paths and launcher profile");
    println!("  config                      Show configuration");
    println!("  config --json               Show configuration as JSON");
    println!("  config set <key> <value>    Change a config value");
    println!("  help                        This help message");
    println!("  --version                   Print version");
    println!();
    println!("EXIT CODES:");
    println!("  0  updates available (check) / success (update)");
    println!("  1  error");
    println!("  2  already up to date (check)");
    println!("  130  cancelled (update)");
    println!();
    println!("ENVIRONMENT:");
    println!("  MODPACK_SYNC_CONFIG         Path to the config file");
    println!("  RUST_LOG                    Log filter (default: info)");
}
