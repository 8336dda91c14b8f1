use eyre::{eyre, Result};
use gumdrop::Options;
use portadoc::{CssInjection, Exporter, LinkPolicy, OutputFormat};
use std::path::PathBuf;

#[derive(Debug, Options)]
struct Opts {
    #[options(help = "Display program help")]
    help: bool,

    #[options(help = "Vault root (or single note) to export", free, required)]
    source: Option<PathBuf>,

    #[options(help = "Destination file or directory", free, required)]
    destination: Option<PathBuf>,

    #[options(
        help = "Output format the documents are prepared for (one of: html, pdf, docx, epub, markdown)",
        no_short,
        long = "format",
        parse(try_from_str = "output_format_from_str"),
        default = "html"
    )]
    format: OutputFormat,

    #[options(
        help = "Internal link handling (one of: keep, strip, text, literal)",
        no_short,
        long = "link-policy",
        parse(try_from_str = "link_policy_from_str"),
        default = "keep"
    )]
    link_policy: LinkPolicy,

    #[options(
        help = "Stylesheet injection (one of: none, light, dark, current)",
        no_short,
        long = "css",
        parse(try_from_str = "css_injection_from_str"),
        default = "light"
    )]
    css: CssInjection,

    #[options(
        help = "Extension appended to internal links without one (e.g. md)",
        no_short,
        long = "link-extension"
    )]
    link_extension: Option<String>,

    #[options(help = "Rasterize diagrams at 2x pixel density", no_short)]
    hidpi: bool,

    #[options(
        help = "Custom stylesheet file, absolute or vault-relative",
        no_short,
        long = "custom-css"
    )]
    custom_css: Option<PathBuf>,
}

fn output_format_from_str(input: &str) -> Result<OutputFormat> {
    match input {
        "html" => Ok(OutputFormat::Html),
        "pdf" => Ok(OutputFormat::Pdf),
        "docx" => Ok(OutputFormat::Docx),
        "epub" => Ok(OutputFormat::Epub),
        "markdown" => Ok(OutputFormat::Markdown),
        _ => Err(eyre!("must be one of: html, pdf, docx, epub, markdown")),
    }
}

fn link_policy_from_str(input: &str) -> Result<LinkPolicy> {
    match input {
        "keep" => Ok(LinkPolicy::KeepAsLink),
        "strip" => Ok(LinkPolicy::Strip),
        "text" => Ok(LinkPolicy::TextOnly),
        "literal" => Ok(LinkPolicy::Literal),
        _ => Err(eyre!("must be one of: keep, strip, text, literal")),
    }
}

fn css_injection_from_str(input: &str) -> Result<CssInjection> {
    match input {
        "none" => Ok(CssInjection::None),
        "light" => Ok(CssInjection::Light),
        "dark" => Ok(CssInjection::Dark),
        "current" => Ok(CssInjection::CurrentTheme),
        _ => Err(eyre!("must be one of: none, light, dark, current")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Opts::parse_args_default_or_exit();
    let source = args.source.unwrap();
    let destination = args.destination.unwrap();

    let mut exporter = Exporter::new(source, destination);
    exporter.output_format(args.format);
    exporter.link_policy(args.link_policy);
    exporter.css_injection(args.css);
    exporter.link_extension(args.link_extension.unwrap_or_default());
    exporter.hidpi_diagrams(args.hidpi);
    exporter.custom_css_file(args.custom_css);
    exporter.run()?;

    Ok(())
}
