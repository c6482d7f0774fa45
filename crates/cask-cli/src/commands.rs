use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use tokio::io::AsyncRead;
use tracing::debug;

use cask_client::{open_registry, Client, ClientConfig, ImageHandle, RemoteContext};
use cask_content::{copy, ContentError, ContentStore, ContentWriter, Provider};
use cask_types::Digest;

use crate::cli::*;

pub fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

pub async fn run_command(cli: Cli, config: ClientConfig) -> anyhow::Result<()> {
    let format = cli.format;
    debug!(root = %config.root.display(), "using storage root");
    match cli.command {
        Command::Content(args) => {
            let client = Client::open(&config).await?;
            cmd_content(&client, args.action, format).await
        }
        Command::Images(args) => {
            let client = Client::open(&config).await?;
            cmd_images(&client, args.action, format).await
        }
        Command::Pull(args) => cmd_pull(config, args, format).await,
        Command::Push(args) => cmd_push(config, args).await,
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn cmd_content(client: &Client, action: ContentAction, format: OutputFormat) -> anyhow::Result<()> {
    let store = client.content();
    match action {
        ContentAction::Ls => {
            let infos = store.list().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
                return Ok(());
            }
            if infos.is_empty() {
                println!("No content.");
            }
            for info in infos {
                println!(
                    "{}  {:>10}  {}",
                    info.digest.to_string().yellow(),
                    info.size,
                    info.committed_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
                );
            }
        }
        ContentAction::Active => {
            let statuses = store.list_statuses().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
                return Ok(());
            }
            if statuses.is_empty() {
                println!("No active ingests.");
            }
            for status in statuses {
                let total = status
                    .expected_total
                    .map_or_else(|| "?".to_string(), |t| t.to_string());
                println!(
                    "{}  {}/{}  updated {}",
                    status.reference.bold(),
                    status.offset,
                    total,
                    status.updated_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
                );
            }
        }
        ContentAction::Get { digest } => {
            let digest: Digest = digest.parse()?;
            let mut reader = store.reader(&digest).await?;
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout).await?;
        }
        ContentAction::Ingest(args) => {
            let digest = cmd_ingest(store.as_ref(), args).await?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "digest": digest.to_string() })),
                OutputFormat::Text => println!("{} Committed {}", "✓".green().bold(), digest.to_string().yellow()),
            }
        }
        ContentAction::Rm { digests } => {
            for digest in digests {
                let parsed: Digest = digest.parse()?;
                store.delete(&parsed).await?;
                println!("Deleted {}", digest.yellow());
            }
        }
        ContentAction::Abort { reference } => {
            store.abort(&reference).await?;
            println!("Aborted ingest {}", reference.bold());
        }
    }
    Ok(())
}

async fn cmd_ingest(store: &dyn ContentStore, args: IngestArgs) -> anyhow::Result<Digest> {
    let expected = args
        .expected_digest
        .as_deref()
        .map(str::parse::<Digest>)
        .transpose()?;
    let source: Box<dyn AsyncRead + Send + Unpin> = match &args.path {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let mut writer = match store
        .writer(&args.reference, args.expected_size, expected.as_ref())
        .await
    {
        Ok(writer) => writer,
        Err(ContentError::AlreadyExists(digest)) => return Ok(digest),
        Err(e) => return Err(e.into()),
    };

    let result = match (args.expected_size, &expected) {
        (Some(size), Some(digest)) => copy(writer.as_mut(), source, size, digest)
            .await
            .map(|()| digest.clone()),
        _ => write_unverified(writer.as_mut(), source, args.expected_size).await,
    };
    writer.close().await?;
    Ok(result?)
}

/// Without both hints there is nothing to resume against or verify up front,
/// so the source is streamed whole and committed under the digest it hashes to.
async fn write_unverified(
    writer: &mut dyn ContentWriter,
    mut source: Box<dyn AsyncRead + Send + Unpin>,
    size: Option<u64>,
) -> Result<Digest, ContentError> {
    use tokio::io::AsyncReadExt;

    if writer.status().offset > 0 {
        return Err(ContentError::WriterClosed(format!(
            "{} has partial data; pass --expected-size and --expected-digest to resume",
            writer.status().reference
        )));
    }
    let mut buf = vec![0u8; cask_content::COPY_CHUNK_SIZE];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n]).await?;
    }
    let digest = writer.digest();
    writer.commit(size, None).await?;
    Ok(digest)
}

async fn cmd_images(client: &Client, action: ImagesAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ImagesAction::Ls => {
            let images = client.list_images()?;
            if format == OutputFormat::Json {
                let list: Vec<_> = images.iter().map(|i| i.image()).collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
                return Ok(());
            }
            if images.is_empty() {
                println!("No images.");
            }
            for image in images {
                println!(
                    "{}  {}  {}",
                    image.name().bold(),
                    image.target().digest.to_string().yellow(),
                    image.target().media_type.dimmed()
                );
            }
        }
        ImagesAction::Rm { names } => {
            for name in names {
                client.delete_image(&name).await?;
                println!("Removed {}", name.bold());
            }
        }
        ImagesAction::Size { name } => {
            let size = client.get_image(&name)?.size().await?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "name": name, "size": size })),
                OutputFormat::Text => println!("{}  {}", name.bold(), size),
            }
        }
        ImagesAction::Rootfs { name } => {
            let diff_ids = client.get_image(&name)?.rootfs().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&diff_ids)?);
                return Ok(());
            }
            for diff_id in diff_ids {
                println!("{diff_id}");
            }
        }
        ImagesAction::Layers { name } => {
            let layers = client.get_image(&name)?.layers().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&layers)?);
                return Ok(());
            }
            for layer in layers {
                println!(
                    "{}  {}  {}",
                    layer.diff.digest.to_string().cyan(),
                    layer.blob.digest.to_string().yellow(),
                    layer.blob.size
                );
            }
        }
        ImagesAction::Check { name } => {
            let image = client.get_image(&name)?;
            print_check(&image, format).await?;
        }
    }
    Ok(())
}

async fn print_check(image: &ImageHandle, format: OutputFormat) -> anyhow::Result<()> {
    let report = image.check().await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if report.is_complete() {
        println!(
            "{} {} complete ({} blobs)",
            "✓".green().bold(),
            image.name().bold(),
            report.required.len()
        );
        return Ok(());
    }
    println!(
        "{} {} missing {} of {} blobs",
        "✗".red().bold(),
        image.name().bold(),
        report.missing.len(),
        report.required.len()
    );
    for desc in &report.missing {
        println!("  {}  {}", desc.digest.to_string().yellow(), desc.media_type.dimmed());
    }
    Ok(())
}

async fn remote_context(config: &ClientConfig, registry: Option<&std::path::Path>) -> anyhow::Result<RemoteContext> {
    let dir = match registry.or(config.remote.registry.as_deref()) {
        Some(dir) => dir,
        None => bail!("no registry given; pass --registry or set [remote] registry"),
    };
    let registry = open_registry(dir)
        .await
        .with_context(|| format!("opening registry at {}", dir.display()))?;
    Ok(RemoteContext::new().with_resolver(Arc::new(registry)))
}

async fn cmd_pull(config: ClientConfig, args: PullArgs, format: OutputFormat) -> anyhow::Result<()> {
    let client = Client::open(&config).await?;
    let ctx = remote_context(&config, args.registry.as_deref()).await?;
    let image = client.pull(&args.reference, ctx).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(image.image())?),
        OutputFormat::Text => println!(
            "{} Pulled {} ({})",
            "✓".green().bold(),
            image.name().bold(),
            image.target().digest.to_string().yellow()
        ),
    }
    Ok(())
}

async fn cmd_push(config: ClientConfig, args: PushArgs) -> anyhow::Result<()> {
    let client = Client::open(&config).await?;
    let ctx = remote_context(&config, args.registry.as_deref()).await?;
    let name = args.image.as_deref().unwrap_or(&args.reference);
    let image = client
        .get_image(name)
        .with_context(|| format!("looking up local image {name}"))?;
    client.push(&args.reference, image.target(), ctx).await?;
    println!(
        "{} Pushed {} to {}",
        "✓".green().bold(),
        image.name().bold(),
        args.reference.yellow()
    );
    Ok(())
}
