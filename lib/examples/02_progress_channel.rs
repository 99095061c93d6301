use neural_style::burn::backend::{Autodiff, NdArray};

fn main() -> Result<(), neural_style::Error> {
    let mut args = std::env::args().skip(1);
    let (content, style) = match (args.next(), args.next()) {
        (Some(content), Some(style)) => (content, style),
        _ => {
            eprintln!("usage: 02_progress_channel <content> <style>");
            std::process::exit(1);
        }
    };

    let weights = std::env::var("NEURAL_STYLE_WEIGHTS").unwrap_or_else(|_| "vgg19.mpk".into());
    let network = neural_style::Vgg19::<Autodiff<NdArray>>::load(weights, &Default::default())?;

    let session = neural_style::Session::builder(network)
        .preset(neural_style::Preset::Faithful)
        .content(&content)
        .style(&style)
        .build()?;

    //progress events are sent into a channel and printed from another
    //thread, the way a server would relay them to a client
    let (tx, rx) = neural_style::crossbeam_channel::unbounded::<neural_style::ProgressEvent>();
    let printer = std::thread::spawn(move || {
        for event in rx {
            println!(
                "{:>3}% step {}/{} loss {:.4}",
                event.percentage as u32, event.current, event.total, event.loss
            );
        }
    });

    let cancel = neural_style::CancelToken::new();
    let styled = session.run_with_cancel(
        Some(Box::new(neural_style::ChannelProgress::new(tx))),
        &cancel,
    )?;

    let _ = printer.join();

    std::fs::create_dir_all("out")?;
    std::fs::write("out/02.jpg", styled.to_jpeg(90)?)?;
    Ok(())
}
