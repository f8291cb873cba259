mod commands;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use pp_core::domain::settings::{CefrLevel, PracticeSettings};
use pp_core::infra::catalog::ScenarioCatalog;
use pp_core::infra::generator::claude::ClaudeGenerator;
use pp_core::infra::generator::{FeedbackGenerator, ScenarioGenerator, ScriptedGenerator};
use pp_core::infra::speech::{EngineSpeechInput, NoopSttEngine};
use pp_core::usecase::conversation_service::{ConversationService, StartOutcome};

use crate::commands::{Command, CommandError, HELP};

/// 生成シナリオで会話練習し、発話ごとに文法フィードバックを受ける
#[derive(Parser, Debug)]
#[command(name = "pocket-polyglot", version, about)]
struct Args {
    /// 設定ファイル（JSON）。省略時は設定ディレクトリの pocket-polyglot/settings.json
    #[arg(long, env = "PP_SETTINGS")]
    settings: Option<PathBuf>,

    /// シナリオ一覧 JSON（設定ファイルの catalog_path より優先）
    #[arg(long, env = "PP_CATALOG")]
    catalog: Option<PathBuf>,

    /// 学習対象言語
    #[arg(long)]
    language: Option<String>,

    /// CEFR レベル (A1〜C2)
    #[arg(long)]
    level: Option<CefrLevel>,

    /// Claude API キー（未設定ならオフラインの台本生成器を使う）
    #[arg(long, env = "PP_CLAUDE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// 起動直後に開始するカテゴリ
    #[arg(long)]
    category: Option<String>,

    /// 起動直後に使うシナリオ（省略時はカテゴリからランダム）
    #[arg(long, requires = "category")]
    scenario: Option<String>,
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pocket-polyglot")
        .join("settings.json")
}

/// 設定ファイルにコマンドライン引数を重ねる
fn load_settings(args: &Args) -> PracticeSettings {
    let path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = PracticeSettings::load(&path);
    if let Some(language) = &args.language {
        settings.target_language = language.clone();
    }
    if let Some(level) = args.level {
        settings.cefr_level = level;
    }
    if let Some(catalog) = &args.catalog {
        settings.catalog_path = Some(catalog.clone());
    }
    if let Some(key) = &args.api_key {
        settings.llm.api_key = Some(key.clone());
    }
    settings
}

/// 生成器を構築する（API キーがあれば Claude, なければ台本）
fn create_generators(
    settings: &PracticeSettings,
) -> (Arc<dyn ScenarioGenerator>, Arc<dyn FeedbackGenerator>) {
    match ClaudeGenerator::new(&settings.llm) {
        Ok(claude) => {
            log::info!("Claude generator selected (model: {})", settings.llm.model);
            let claude = Arc::new(claude);
            let scenario: Arc<dyn ScenarioGenerator> = claude.clone();
            (scenario, claude)
        }
        Err(e) => {
            log::warn!("{e}: オフラインの台本生成器を使用します");
            let scripted = Arc::new(ScriptedGenerator);
            let scenario: Arc<dyn ScenarioGenerator> = scripted.clone();
            (scenario, scripted)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CommandError> {
    let settings = load_settings(&args);
    let catalog = match &settings.catalog_path {
        Some(path) => ScenarioCatalog::load(path),
        None => ScenarioCatalog::builtin(),
    };
    let (scenario_gen, feedback_gen) = create_generators(&settings);
    // マイク入力は持たないため、録音は固定文で書き起こされる
    let speech = Arc::new(EngineSpeechInput::new(
        Arc::new(NoopSttEngine::default()),
        16_000,
        None,
    ));

    log::info!("--- Practice ---");
    log::info!("Language: {}", settings.target_language);
    log::info!("CEFR level: {}", settings.cefr_level);
    log::info!("Categories: {}", catalog.categories().join(", "));
    log::info!("----------------");

    let service = Arc::new(ConversationService::new(
        catalog,
        settings,
        scenario_gen,
        feedback_gen,
        speech,
    )?);
    let renderer = tokio::spawn(render::follow(service.subscribe()));

    let mut last_category = args.category.clone();
    if let Some(category) = &args.category {
        spawn_start(&service, category.clone(), args.scenario.clone().unwrap_or_default());
    } else {
        println!("{HELP}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            Command::Empty => {}
            Command::Say(text) => {
                if !service.submit_user_utterance(&text) {
                    println!("{}", render::rejected_utterance_message(service.snapshot().phase));
                }
            }
            Command::Start { category, scenario } => {
                let Some(category) = category
                    .or_else(|| last_category.clone())
                    .or_else(|| service.catalog().categories().first().map(|c| c.to_string()))
                else {
                    println!("カテゴリがありません");
                    continue;
                };
                spawn_start(&service, category.clone(), scenario.unwrap_or_default());
                last_category = Some(category);
            }
            Command::Reset => service.reset_conversation(),
            Command::Categories => {
                for category in service.catalog().categories() {
                    println!("  {category}");
                }
            }
            Command::Scenarios(category) => {
                let prompts = service.catalog().prompts(&category);
                if prompts.is_empty() {
                    println!("カテゴリ '{category}' は登録されていません");
                }
                for prompt in prompts {
                    println!("  {prompt}");
                }
            }
            Command::Record => {
                if !service.start_recording() {
                    println!("録音を開始できません");
                }
            }
            Command::Stop => service.stop_recording().await,
            Command::Cancel => service.cancel_recording(),
            Command::Status => print_json(&service.snapshot()),
            Command::Metrics => print_json(&service.metrics()),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    service.reset_conversation();
    renderer.abort();
    Ok(())
}

/// 生成中も入力（/reset など）を受け付けるため、開始処理は別タスクで走らせる
fn spawn_start(service: &Arc<ConversationService>, category: String, scenario: String) {
    let service = service.clone();
    tokio::spawn(async move {
        match service.start_conversation(&category, &scenario).await {
            StartOutcome::Ignored => println!("カテゴリ '{category}' にシナリオがありません"),
            StartOutcome::Discarded => log::debug!("[{category}] の開始結果は破棄されました"),
            StartOutcome::Ready | StartOutcome::Failed => {}
        }
    });
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("JSON 変換失敗: {e}"),
    }
}
