use crate::app::AppContext;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum SessionAction {
    /// List every known session key.
    List,
    /// Print a session's messages.
    Show { key: String },
    /// Delete a session's persisted state.
    Reset { key: String },
}

pub async fn dispatch(ctx: &AppContext, action: SessionAction) -> Result<(), String> {
    match action {
        SessionAction::List => {
            for key in ctx.sessions.list_sessions() {
                println!("{key}");
            }
            Ok(())
        }
        SessionAction::Show { key } => {
            let Some(session) = ctx.sessions.get(&key) else {
                return Err(format!("no such session: {key}"));
            };
            for msg in &session.messages {
                let role = format!("{:?}", msg.role).to_lowercase();
                match &msg.content {
                    Some(content) => println!("[{role}] {content}"),
                    None if !msg.tool_calls.is_empty() => {
                        let names: Vec<&str> = msg.tool_calls.iter().map(|c| c.function_name.as_str()).collect();
                        println!("[{role}] (tool calls: {})", names.join(", "));
                    }
                    None => println!("[{role}] (empty)"),
                }
            }
            if let Some(summary) = &session.summary {
                println!("\n--- summary ---\n{summary}");
            }
            Ok(())
        }
        SessionAction::Reset { key } => {
            ctx.engine.reset_session(&key).await.map_err(|e| e.to_string())?;
            println!("Session '{key}' reset.");
            Ok(())
        }
    }
}
