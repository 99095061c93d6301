use neural_style::burn::backend::{Autodiff, NdArray};

fn main() -> Result<(), neural_style::Error> {
    let mut args = std::env::args().skip(1);
    let (content, style) = match (args.next(), args.next()) {
        (Some(content), Some(style)) => (content, style),
        _ => {
            eprintln!("usage: 01_style_transfer <content> <style>");
            std::process::exit(1);
        }
    };

    //load the pretrained network, once per process
    let weights = std::env::var("NEURAL_STYLE_WEIGHTS").unwrap_or_else(|_| "vgg19.mpk".into());
    let network = neural_style::Vgg19::<Autodiff<NdArray>>::load(weights, &Default::default())?;

    //create a new session
    let session = neural_style::Session::builder(network)
        .content(&content)
        .style(&style)
        .build()?;

    //optimize the output image
    let styled = session.run(None)?;

    //save the image to the disk
    styled.save("out/01.jpg")
}
