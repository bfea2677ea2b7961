use std::env;
use std::fs::{self, File};
use std::io::{prelude::*, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use jifplay::{GifPlayer, PlayerOptions, RenderOutcome};
use log::{info, warn};

const MAGIC_NUMBER: &[u8] = b"P7";

fn write_pam(filename: &Path, width: u16, height: u16, rgba: &[u8]) -> Result<()> {
    let file = File::create(filename)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC_NUMBER)?;
    writer.write_all(b"\n")?;
    write!(
        writer,
        "WIDTH {}\nHEIGHT {}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
        width, height
    )?;
    writer.write_all(rgba)?;
    writer.flush()?;

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args_os().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        bail!("usage: dump_frames <input.gif> <output dir>");
    };
    let output = PathBuf::from(output);

    let file = File::open(&input).with_context(|| format!("failed to open {:?}", input))?;
    let player = GifPlayer::open(BufReader::new(file), PlayerOptions::default())
        .with_context(|| format!("{:?} is not a readable GIF", input))?;
    fs::create_dir_all(&output)?;

    let decoder = player.decoder();
    let header = decoder.header();
    info!(
        "{}x{}, {} frames, {:?} per iteration, loop count {:?}",
        header.width,
        header.height,
        decoder.frame_count(),
        player.timeline().total(),
        player.iteration_count()
    );

    let mut rgba = vec![0; header.pixel_count() * 4];
    for index in 0..decoder.frame_count() {
        match decoder.render_frame(index, false) {
            RenderOutcome::Rendered | RenderOutcome::Unchanged => {}
            RenderOutcome::Degraded { frames } => warn!("frames {:?} decoded blank", frames),
            outcome => bail!("could not render frame {}: {:?}", index, outcome),
        }

        if !decoder.copy_canvas_to(&mut rgba) {
            bail!("decoder was disposed while rendering frame {}", index);
        }

        let path = output.join(format!("frame_{:04}.pam", index));
        write_pam(&path, header.width, header.height, &rgba)?;
        info!("wrote {}", path.display());
    }

    player.dispose();
    Ok(())
}
