use crate::app::AppContext;
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive REPL: reads lines from stdin, runs each as one turn
/// against `session`, and prints the response. `/reset`, `/compact`,
/// and `/exit` are handled locally rather than sent to the model.
pub async fn chat(ctx: &AppContext, session: &str, model: Option<&str>) -> Result<(), String> {
    println!("grip chat — session '{session}'. Type /exit to quit, /reset to clear, /compact to consolidate.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().map_err(|e| e.to_string())?;

        let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/exit" | "/quit" => break,
            "/reset" => {
                ctx.engine.reset_session(session).await.map_err(|e| e.to_string())?;
                println!("Session reset.");
                continue;
            }
            "/compact" => {
                ctx.engine.consolidate_session(session).await.map_err(|e| e.to_string())?;
                println!("Session consolidated.");
                continue;
            }
            _ => {}
        }

        match ctx.engine.run(line, session, model).await {
            Ok(result) => println!("{}", result.response),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
