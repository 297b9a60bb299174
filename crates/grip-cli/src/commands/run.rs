use crate::app::AppContext;

pub async fn run(ctx: &AppContext, message: &str, session: &str, model: Option<&str>) -> Result<(), String> {
    let result = ctx.engine.run(message, session, model).await.map_err(|e| e.to_string())?;
    println!("{}", result.response);
    log::debug!(
        "iterations={} tokens={} tools={:?}",
        result.iterations,
        result.total_tokens(),
        result.tool_calls_made
    );
    Ok(())
}
