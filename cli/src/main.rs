mod progress_bar;

use structopt::StructOpt;

use neural_style::{
    image::ImageOutputFormat as ImgFmt, Error, Preset, Session, StyleNormalization, Vgg19,
};
use progress_bar::{JsonProgress, ProgressBar};
use std::path::PathBuf;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

#[cfg(not(feature = "wgpu"))]
type Backend = burn::backend::Autodiff<burn::backend::NdArray>;
#[cfg(feature = "wgpu")]
type Backend = burn::backend::Autodiff<burn::backend::Wgpu>;

fn parse_img_fmt(input: &str) -> Result<ImgFmt, String> {
    let fmt = match input {
        "png" => ImgFmt::Png,
        "jpg" => ImgFmt::Jpeg(90),
        "bmp" => ImgFmt::Bmp,
        other => {
            return Err(format!(
                "image format `{}` not one of: 'png', 'jpg', 'bmp'",
                other
            ))
        }
    };

    Ok(fmt)
}

fn parse_normalization(input: &str) -> Result<StyleNormalization, String> {
    match input {
        "channels-squared" => Ok(StyleNormalization::ChannelsSquared),
        "volume" => Ok(StyleNormalization::Volume),
        other => Err(format!(
            "normalization `{}` not one of: 'channels-squared', 'volume'",
            other
        )),
    }
}

fn parse_layer_weights(input: &str) -> Result<[f32; 5], String> {
    let weights = input
        .split(',')
        .map(|w| w.trim().parse::<f32>().map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    match weights.as_slice() {
        [a, b, c, d, e] => Ok([*a, *b, *c, *d, *e]),
        _ => Err(format!(
            "expected 5 comma separated weights, got {}",
            weights.len()
        )),
    }
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Transfer {
    /// The image whose structure is kept, the output has its aspect ratio
    #[structopt(parse(from_os_str))]
    content: PathBuf,
    /// The image whose textures and colors are transferred onto the content
    #[structopt(long, parse(from_os_str))]
    style: PathBuf,
    /// The path to save the stylized image to, the file extension of the path
    /// determines the image format used. You may use `-` for stdout.
    #[structopt(long = "out", short, parse(from_os_str))]
    output_path: PathBuf,
    /// The format to save the stylized image as.
    ///
    /// NOTE: this will only apply when stdout is specified via `-o -`, otherwise the image
    /// format is determined by the file extension of the path provided to `-o`
    #[structopt(
        long,
        default_value = "png",
        parse(try_from_str = parse_img_fmt)
    )]
    out_fmt: ImgFmt,
    /// Starting point for the step count and loss weights, either `stylized`
    /// or `faithful`. Any of those set explicitly override the preset.
    #[structopt(long, default_value = "stylized")]
    preset: Preset,
    /// The number of optimization steps
    #[structopt(long)]
    steps: Option<u32>,
    /// The Adam learning rate
    #[structopt(long = "lr", default_value = "0.003")]
    learning_rate: f64,
    /// The weight of the content loss
    #[structopt(long)]
    content_weight: Option<f32>,
    /// The weight of the style loss, higher values favor texture over structure
    #[structopt(long)]
    style_weight: Option<f32>,
    /// The relative weights of the conv1_1, conv2_1, conv3_1, conv4_1 and
    /// conv5_1 layers in the style loss, comma separated
    #[structopt(long, parse(try_from_str = parse_layer_weights))]
    layer_weights: Option<[f32; 5]>,
    /// How each layer's style loss is normalized, `channels-squared` or `volume`
    #[structopt(
        long,
        default_value = "channels-squared",
        parse(try_from_str = parse_normalization)
    )]
    normalization: StyleNormalization,
    /// Content images with a longer side are scaled down to this size
    #[structopt(long = "max-size", default_value = "128")]
    max_dimension: u32,
    /// Don't show a progress bar
    #[structopt(long)]
    no_progress: bool,
    /// Print every progress event as a line of JSON to stderr instead of
    /// showing a progress bar
    #[structopt(long)]
    progress_json: bool,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct ConvertWeights {
    /// The `.mpk` file the converted weights are written to
    #[structopt(long = "out", short, parse(from_os_str))]
    output_path: PathBuf,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Transfers the style of one image onto the content of another
    #[structopt(name = "transfer")]
    Transfer(Transfer),
    /// Converts the loaded weights into the native `.mpk` format, which
    /// loads faster than a PyTorch checkpoint
    #[structopt(name = "convert-weights")]
    ConvertWeights(ConvertWeights),
}

#[derive(StructOpt)]
#[structopt(
    name = "neural-style",
    about = "Transfers the style of one image onto another",
    rename_all = "kebab-case"
)]
struct Opt {
    /// Path to the VGG-19 weights, either a torchvision `.pth` checkpoint or
    /// an `.mpk` file written by `convert-weights`
    #[structopt(long, env = "NEURAL_STYLE_WEIGHTS", parse(from_os_str))]
    weights: PathBuf,
    /// Log more, can be given twice
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
    #[structopt(subcommand)]
    cmd: Subcommand,
}

fn main() {
    if let Err(e) = real_main() {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("\x1b[31merror\x1b[0m: {}", e);
        } else {
            eprintln!("error: {}", e);
        }

        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // stdout may carry the image, so logs always go to stderr
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_filter(level);

    tracing_subscriber::registry().with(layer).init();
}

fn real_main() -> Result<(), Error> {
    let args = Opt::from_args();
    init_logging(args.verbose);

    let device = Default::default();
    let network = Vgg19::<Backend>::load(&args.weights, &device)?;

    match args.cmd {
        Subcommand::Transfer(transfer) => run_transfer(network, device, transfer),
        Subcommand::ConvertWeights(convert) => {
            network.save_mpk(&convert.output_path)?;
            log::info!("wrote weights to {}", convert.output_path.display());
            Ok(())
        }
    }
}

fn run_transfer(
    network: Vgg19<Backend>,
    device: <Backend as burn::tensor::backend::Backend>::Device,
    args: Transfer,
) -> Result<(), Error> {
    // Check that the extension for the path supplied by the user is one of the ones we support
    {
        match args.output_path.extension().and_then(|ext| ext.to_str()) {
            Some("png") | Some("jpg") | Some("jpeg") | Some("bmp") => {}
            None => {}
            Some(other) => return Err(Error::UnsupportedOutputFormat(other.to_owned())),
        }
    }

    let mut sb = Session::builder(network)
        .device(device)
        .preset(args.preset)
        .learning_rate(args.learning_rate)
        .style_normalization(args.normalization)
        .max_dimension(args.max_dimension)
        .content(&args.content)
        .style(&args.style);

    if let Some(steps) = args.steps {
        sb = sb.steps(steps);
    }

    if let Some(weight) = args.content_weight {
        sb = sb.content_weight(weight);
    }

    if let Some(weight) = args.style_weight {
        sb = sb.style_weight(weight);
    }

    if let Some(weights) = args.layer_weights {
        sb = sb.style_layer_weights(weights);
    }

    let session = sb.build()?;

    let progress: Option<Box<dyn neural_style::Progress>> = if args.progress_json {
        Some(Box::new(JsonProgress::new()))
    } else if !args.no_progress {
        Some(Box::new(ProgressBar::new()))
    } else {
        None
    };

    let styled = session.run(progress)?;

    if args.output_path.to_str() == Some("-") {
        // The encoders need to seek, which stdout can't
        let mut buffer = std::io::Cursor::new(Vec::new());
        styled.write(&mut buffer, args.out_fmt)?;

        use std::io::Write;
        let out = std::io::stdout();
        let mut out = out.lock();
        out.write_all(buffer.get_ref())?;
        out.flush()?;
    } else {
        // This won't respect the output format specified by the user,
        // only the extension on the path they specify
        styled.save(&args.output_path)?;
    }

    Ok(())
}
