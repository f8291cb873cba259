use pp_core::domain::error::AppError;

/// コマンドエラー型
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    App(#[from] AppError),
    #[error("入出力エラー: {0}")]
    Io(#[from] std::io::Error),
    #[error("不明なコマンド: /{0}（/help で一覧）")]
    Unknown(String),
    #[error("/{0} には引数が必要です")]
    MissingArgument(&'static str),
}

/// 1行分の入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/new [category][: scenario]`
    Start {
        category: Option<String>,
        scenario: Option<String>,
    },
    Reset,
    Categories,
    Scenarios(String),
    Record,
    Stop,
    Cancel,
    Metrics,
    Status,
    Help,
    Quit,
    /// スラッシュ以外の行は学習者の発話
    Say(String),
    Empty,
}

pub const HELP: &str = "\
/new [category][: scenario]  新しい会話を始める
/reset                       会話を消去する
/categories                  カテゴリ一覧
/scenarios <category>        カテゴリ内のシナリオ一覧
/record, /stop, /cancel      音声入力の開始・確定・破棄
/status                      現在の状態（JSON）
/metrics                     メトリクス（JSON）
/quit                        終了
それ以外の行は発話として送信されます";

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// 入力行を解析する
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(body) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let (name, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let command = match name {
        "new" | "start" => {
            let (category, scenario) = match rest.split_once(':') {
                Some((category, scenario)) => (non_empty(category), non_empty(scenario)),
                None => (non_empty(rest), None),
            };
            Command::Start { category, scenario }
        }
        "reset" => Command::Reset,
        "categories" => Command::Categories,
        "scenarios" => {
            Command::Scenarios(non_empty(rest).ok_or(CommandError::MissingArgument("scenarios"))?)
        }
        "record" => Command::Record,
        "stop" => Command::Stop,
        "cancel" => Command::Cancel,
        "metrics" => Command::Metrics,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}
