use crate::app::AppContext;
use clap::Subcommand;
use grip_core::config::{save_config, GripConfig};

#[derive(Subcommand)]
pub enum McpAction {
    /// List configured MCP servers and their connection status.
    List,
    /// Run the browser-based OAuth login flow for a server.
    Login { name: String },
    /// Enable a configured MCP server and reconnect to it.
    Enable { name: String },
    /// Disable a configured MCP server and disconnect from it.
    Disable { name: String },
}

pub async fn dispatch(ctx: &AppContext, action: McpAction) -> Result<(), String> {
    match action {
        McpAction::List => {
            for (name, status) in ctx.mcp.status_list(&ctx.config) {
                println!("{name}: {status:?}");
            }
            Ok(())
        }
        McpAction::Login { name } => {
            let entry = ctx
                .config
                .tools
                .mcp_servers
                .get(&name)
                .ok_or_else(|| format!("no such MCP server: {name}"))?;
            let oauth_cfg = entry.oauth.clone().ok_or_else(|| format!("'{name}' has no OAuth configuration"))?;
            ctx.mcp.login_blocking(&name, oauth_cfg).await?;
            println!("Logged in to '{name}'.");
            Ok(())
        }
        McpAction::Enable { name } => set_enabled(ctx, &name, true).await,
        McpAction::Disable { name } => set_enabled(ctx, &name, false).await,
    }
}

async fn set_enabled(ctx: &AppContext, name: &str, enabled: bool) -> Result<(), String> {
    let mut config: GripConfig = (*ctx.config).clone();
    let entry = config.tools.mcp_servers.get_mut(name).ok_or_else(|| format!("no such MCP server: {name}"))?;
    entry.enabled = enabled;
    let entry = entry.clone();
    save_config(&config, None).map_err(|e| e.to_string())?;

    if enabled {
        ctx.mcp.reconnect_server(name, entry).await?;
        println!("Enabled and connected '{name}'.");
    } else {
        ctx.mcp.disconnect(name).await;
        println!("Disabled '{name}'.");
    }
    Ok(())
}
