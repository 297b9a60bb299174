use crate::app::AppContext;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum TrustAction {
    /// List every trusted directory.
    List,
    /// Grant trust to a directory (and its subdirectories).
    Add { directory: PathBuf },
    /// Revoke trust for a directory.
    Remove { directory: PathBuf },
}

pub async fn dispatch(ctx: &AppContext, action: TrustAction) -> Result<(), String> {
    match action {
        TrustAction::List => {
            for dir in ctx.trust.trusted_directories().await {
                println!("{dir}");
            }
            Ok(())
        }
        TrustAction::Add { directory } => {
            ctx.trust.trust(&directory).await;
            println!("Trusted: {}", directory.display());
            Ok(())
        }
        TrustAction::Remove { directory } => {
            if ctx.trust.revoke(&directory).await {
                println!("Revoked: {}", directory.display());
                Ok(())
            } else {
                Err(format!("'{}' was not trusted", directory.display()))
            }
        }
    }
}
