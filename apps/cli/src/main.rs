mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tabcaption_core::{
    CaptionService, Document, Environment, ExpansionContext, Logger, OptionValues, Options,
    Synchronizer, TemplateExpander, TracingSink, Variable,
};
use tabcaption_project::{
    apply_file_event, scan_directory, FileMonitor, Workspace, WorkspaceSnapshot, WorkspaceStore,
};
use tabcaption_settings::{apply_update, OptionKey, OptionsStore};

#[derive(Parser)]
#[command(
    name = "tabcaption",
    about = "Project-aware tab captions driven by templates",
    author,
    version
)]
struct Cli {
    /// 指定工作區根目錄；預設為目前目錄。 / Workspace root (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,
    /// 設定檔路徑。 / Options file (defaults to `<workspace>/.tabcaption/options.json`).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// 提高診斷輸出等級。 / Raise diagnostic verbosity (repeatable).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 以單一文件展開樣板。 / Expand a template for a single document.
    Expand(ExpandArgs),
    /// 列出樣板變數。 / List the template variables.
    Variables,
    /// 計算已儲存工作區的標題。 / Compute captions for a saved workspace.
    Captions(CaptionsArgs),
    /// 檢視或修改選項。 / Show or change the stored options.
    #[command(subcommand)]
    Options(OptionsCommand),
    /// 監看目錄並持續更新標題。 / Watch a directory and keep captions current.
    Watch(WatchArgs),
}

#[derive(Args)]
struct ExpandArgs {
    /// 標題樣板。 / Caption template.
    template: String,

    /// 文件的完整路徑。 / Full path of the document.
    #[arg(long, value_name = "PATH")]
    path: String,

    /// 文件所屬專案。 / Project owning the document.
    #[arg(long, value_name = "NAME")]
    project: Option<String>,

    /// 將專案標為內建專案。 / Mark the project as built-in.
    #[arg(long, requires = "project")]
    builtin: bool,

    /// 由外而內的專案資料夾。 / Project folders above the document, outermost first.
    #[arg(long = "folder", value_name = "NAME", requires = "project")]
    folders: Vec<String>,

    /// 覆寫 ignore-single-project 選項。 / Override the ignore-single-project option.
    #[arg(long, value_name = "true|false")]
    ignore_single_project: Option<bool>,

    /// 覆寫 ignore-builtin-projects 選項。 / Override the ignore-builtin-projects option.
    #[arg(long, value_name = "true|false")]
    ignore_builtin_projects: Option<bool>,
}

#[derive(Args)]
struct CaptionsArgs {
    /// 工作區 JSON 檔案。 / Workspace JSON file.
    #[arg(value_name = "WORKSPACE_JSON")]
    input: PathBuf,
}

#[derive(Subcommand)]
enum OptionsCommand {
    /// 顯示所有選項。 / Print every option.
    Show,
    /// 設定單一選項。 / Set one option.
    Set(OptionsSetArgs),
    /// 切換啟用狀態。 / Flip the enabled option.
    Toggle,
    /// 還原預設值。 / Restore the defaults.
    Reset,
}

#[derive(Args)]
struct OptionsSetArgs {
    /// 選項名稱，例如 `template`。 / Option name, e.g. `template`.
    key: String,
    /// 新的值。 / New value.
    #[arg(allow_hyphen_values = true)]
    value: String,
}

#[derive(Args)]
struct WatchArgs {
    /// 要監看的專案目錄。 / Project directory to watch.
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// 要開啟的檔案（相對於目錄）。 / Files to open, relative to the directory.
    #[arg(long = "open", value_name = "FILE")]
    open: Vec<PathBuf>,

    /// 在指定毫秒後結束。 / Exit after this many milliseconds.
    #[arg(long, value_name = "MS")]
    exit_after_ms: Option<u64>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        workspace,
        config,
        verbose,
        command,
    } = Cli::parse();
    let workspace_root = resolve_workspace(workspace)?;
    let config_path = match config {
        Some(path) => resolve_input_path(&path)?,
        None => options_path(&workspace_root),
    };

    let store = OptionsStore::load(&config_path)
        .with_context(|| format!("failed to load options from {}", config_path.display()))?;
    logging::init(&logging::filter_for(verbose, store.values().logging));

    match command {
        Commands::Expand(args) => execute_expand(args, store.values().clone()),
        Commands::Variables => {
            list_variables();
            Ok(())
        }
        Commands::Captions(args) => execute_captions(args, store.values().clone()),
        Commands::Options(subcommand) => execute_options_command(subcommand, store),
        Commands::Watch(args) => execute_watch(args, store.values().clone()),
    }
}

fn engine_logger(values: &OptionValues) -> Logger {
    Logger::new(Arc::new(TracingSink), values.logging, values.logging_level)
}

fn execute_expand(args: ExpandArgs, mut values: OptionValues) -> Result<()> {
    if let Some(ignore) = args.ignore_single_project {
        values.ignore_single_project = ignore;
    }
    if let Some(ignore) = args.ignore_builtin_projects {
        values.ignore_builtin_projects = ignore;
    }

    let workspace = Workspace::new();
    if let Some(name) = &args.project {
        let project = workspace.add_project(name.clone(), args.builtin);
        let mut parent = workspace.project_root(project)?;
        for folder in &args.folders {
            parent = workspace
                .add_folder(project, parent, folder.clone())
                .with_context(|| format!("failed to add folder '{folder}'"))?;
        }
        workspace
            .add_file(project, parent, args.path.clone())
            .with_context(|| format!("failed to add '{}' to project '{name}'", args.path))?;
    }
    let document = workspace.open_document(args.path.clone());

    let expander = TemplateExpander::new(engine_logger(&values));
    let context = ExpansionContext::new(&*document, &values, &*workspace);
    println!("{}", expander.expand(&context, &args.template));
    Ok(())
}

fn list_variables() {
    for variable in Variable::ALL {
        println!("{:<14} {}", variable.name(), variable.description());
    }
}

fn execute_captions(args: CaptionsArgs, values: OptionValues) -> Result<()> {
    let input = resolve_input_path(&args.input)?;
    let snapshot = WorkspaceStore::new(&input)
        .load()
        .with_context(|| format!("failed to load workspace from {}", input.display()))?
        .ok_or_else(|| anyhow!("workspace file {} does not exist", input.display()))?;
    let workspace = Workspace::from_snapshot(&snapshot)
        .with_context(|| format!("invalid project tree in {}", input.display()))?;

    let logger = engine_logger(&values);
    let mut synchronizer = Synchronizer::new(
        Environment::shared(Arc::clone(&workspace)),
        Options::new(values),
        logger,
    );
    synchronizer.drain();
    if synchronizer.consecutive_failures() > 0 {
        tracing::warn!(
            failures = synchronizer.consecutive_failures(),
            "some captions could not be applied"
        );
    }

    for document in workspace.open_documents() {
        let caption = document.caption().unwrap_or_else(|| document.name());
        println!("{}\t{}", document.path(), caption);
    }
    Ok(())
}

fn execute_options_command(command: OptionsCommand, mut store: OptionsStore) -> Result<()> {
    let path = store.path().to_path_buf();
    match command {
        OptionsCommand::Show => {
            for key in OptionKey::ALL {
                println!("{key} = {}", key.read(store.values()));
            }
        }
        OptionsCommand::Set(args) => {
            let key: OptionKey = args.key.parse()?;
            let update = key.parse_update(&args.value)?;
            let mut changed = false;
            store
                .update(|values| changed = apply_update(values, update.clone()))
                .with_context(|| format!("failed to save options to {}", path.display()))?;
            if !changed {
                tracing::info!(%key, "option already had this value");
            }
            println!("{key} = {}", key.read(store.values()));
        }
        OptionsCommand::Toggle => {
            store
                .update(|values| values.enabled = !values.enabled)
                .with_context(|| format!("failed to save options to {}", path.display()))?;
            println!("{} = {}", OptionKey::Enabled, store.values().enabled);
        }
        OptionsCommand::Reset => {
            store
                .overwrite(OptionValues::default())
                .with_context(|| format!("failed to save options to {}", path.display()))?;
            println!("Options reset to defaults in {}", path.display());
        }
    }
    Ok(())
}

fn execute_watch(args: WatchArgs, values: OptionValues) -> Result<()> {
    let dir = resolve_input_path(&args.dir)?;
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let root = dir
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", dir.display()))?;

    let project = scan_directory(&root)
        .with_context(|| format!("failed to scan {}", root.display()))?;
    let open = args
        .open
        .iter()
        .map(|file| {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                root.join(file)
            };
            path.to_string_lossy().into_owned()
        })
        .collect();
    let snapshot = WorkspaceSnapshot {
        projects: vec![project],
        open,
        ..WorkspaceSnapshot::default()
    };
    let workspace = Workspace::from_snapshot(&snapshot)
        .with_context(|| format!("failed to build a workspace for {}", root.display()))?;

    let _captions = workspace.subscribe_captions(|update| {
        println!("{}\t{}", update.path, update.caption);
    });

    let mut monitor = FileMonitor::new().context("failed to create file watcher")?;
    monitor
        .watch(&root)
        .with_context(|| format!("failed to watch {}", root.display()))?;

    let logger = engine_logger(&values);
    let synchronizer = Synchronizer::new(
        Environment::shared(Arc::clone(&workspace)),
        Options::new(values),
        logger,
    );
    let (handle, service) = CaptionService::new(synchronizer)
        .spawn()
        .context("failed to start caption service")?;
    tracing::info!(root = %root.display(), "watching");

    let deadline = args
        .exit_after_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let result = pump_file_events(&monitor, &workspace, deadline);

    handle.shutdown().ok();
    service
        .join()
        .map_err(|_| anyhow!("caption service panicked"))?;
    result
}

fn pump_file_events(
    monitor: &FileMonitor,
    workspace: &Workspace,
    deadline: Option<Instant>,
) -> Result<()> {
    const POLL: Duration = Duration::from_millis(50);
    loop {
        let timeout = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(());
                }
                POLL.min(deadline - now)
            }
            None => POLL,
        };
        if let Some(event) = monitor.recv_timeout(timeout)? {
            if let Err(err) = apply_file_event(workspace, &event) {
                tracing::warn!(error = %err, path = %event.path.display(), "file event ignored");
            }
        }
    }
}

fn options_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".tabcaption").join("options.json")
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => resolve_input_path(&path),
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
