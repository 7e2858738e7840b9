// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

extern crate clap;
extern crate failure;
extern crate flamerender;
extern crate image;
extern crate num_cpus;
extern crate tracing;
extern crate tracing_subscriber;

use clap::{App, Arg, ArgMatches};
use failure::{format_err, Error};
use image::codecs::hdr::HdrEncoder;
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ColorType, Rgb32FImage, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, Level};

use flamerender::{Flame, FlameRenderer, ProgressUpdater, RenderInfo, RendererConfig, SeededSource};

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + PartialOrd>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

fn validate_number<T: FromStr>(s: &str, err: &str) -> Result<(), String> {
    match T::from_str(s) {
        Ok(_) => Ok(()),
        Err(_) => Err(err.to_string()),
    }
}

const OUTPUT: &str = "output";
const SIZE: &str = "size";
const PRESET: &str = "preset";
const DENSITY: &str = "density";
const PPU: &str = "pixels-per-unit";
const SPATIAL: &str = "spatial-oversample";
const COLOR: &str = "color-oversample";
const RADIUS: &str = "filter-radius";
const THREADS: &str = "threads";
const SEED: &str = "seed";
const HDR: &str = "hdr";
const YAW: &str = "yaw";
const PITCH: &str = "pitch";
const PERSPECTIVE: &str = "perspective";
const DOF: &str = "dof";
const QUIET: &str = "quiet";
const VERBOSE: &str = "verbose";

fn angle<'a, 'b>(name: &'a str, help: &'a str) -> Arg<'a, 'b> {
    Arg::with_name(name)
        .required(false)
        .long(name)
        .takes_value(true)
        .allow_hyphen_values(true)
        .default_value("0")
        .validator(|s| validate_number::<f64>(&s, "Could not parse camera setting"))
        .help(help)
}

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();

    App::new("flame")
        .version("0.1.0")
        .about("Fractal flame renderer")
        .arg(
            Arg::with_name(OUTPUT)
                .required(true)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .help("Output file; .pnm and .ppm are written as binary pixmaps, anything else by extension"),
        )
        .arg(
            Arg::with_name(SIZE)
                .required(false)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("800x600")
                .validator(|s| validate_pair::<u16>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image"),
        )
        .arg(
            Arg::with_name(PRESET)
                .required(false)
                .long(PRESET)
                .short("p")
                .takes_value(true)
                .possible_values(&["sierpinski", "spiral"])
                .default_value("sierpinski")
                .help("Built-in scene to render"),
        )
        .arg(
            Arg::with_name(DENSITY)
                .required(false)
                .long(DENSITY)
                .short("d")
                .takes_value(true)
                .default_value("100")
                .validator(|s| {
                    validate_range(
                        &s,
                        0.01,
                        100_000.0,
                        "Could not parse sample density",
                        "Sample density must be between 0.01 and 100000",
                    )
                })
                .help("Samples per raster cell"),
        )
        .arg(
            Arg::with_name(PPU)
                .required(false)
                .long(PPU)
                .takes_value(true)
                .validator(|s| {
                    validate_range(
                        &s,
                        0.001,
                        1.0e6,
                        "Could not parse pixels per unit",
                        "Pixels per unit must be positive",
                    )
                })
                .help("Scale of the view; the preset's own if not given"),
        )
        .arg(
            Arg::with_name(SPATIAL)
                .required(false)
                .long(SPATIAL)
                .takes_value(true)
                .default_value("1")
                .validator(|s| validate_number::<u32>(&s, "Could not parse spatial oversample"))
                .help("Spatial oversampling factor, 1 to 6"),
        )
        .arg(
            Arg::with_name(COLOR)
                .required(false)
                .long(COLOR)
                .takes_value(true)
                .default_value("1")
                .validator(|s| validate_number::<u32>(&s, "Could not parse color oversample"))
                .help("Color oversampling factor, 1 to 10"),
        )
        .arg(
            Arg::with_name(RADIUS)
                .required(false)
                .long(RADIUS)
                .short("r")
                .takes_value(true)
                .default_value("0.75")
                .validator(|s| {
                    validate_range(
                        &s,
                        0.0,
                        10.0,
                        "Could not parse filter radius",
                        "Filter radius must be between 0 and 10",
                    )
                })
                .help("Radius of the density estimation filter, in pixels"),
        )
        .arg(
            Arg::with_name(THREADS)
                .required(false)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of threads to use in solver; all cores if not given"),
        )
        .arg(
            Arg::with_name(SEED)
                .required(false)
                .long(SEED)
                .takes_value(true)
                .validator(|s| validate_number::<u64>(&s, "Could not parse seed"))
                .help("Seed for a repeatable render"),
        )
        .arg(
            Arg::with_name(HDR)
                .required(false)
                .long(HDR)
                .takes_value(true)
                .help("Also write a Radiance HDR image to this file"),
        )
        .arg(angle(YAW, "Camera yaw, in degrees"))
        .arg(angle(PITCH, "Camera pitch, in degrees"))
        .arg(angle(PERSPECTIVE, "Perspective strength"))
        .arg(angle(DOF, "Depth of field blur"))
        .arg(
            Arg::with_name(QUIET)
                .long(QUIET)
                .short("q")
                .conflicts_with(VERBOSE)
                .help("Only log warnings"),
        )
        .arg(
            Arg::with_name(VERBOSE)
                .long(VERBOSE)
                .short("v")
                .help("Log pass details"),
        )
        .get_matches()
}

fn value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, Error> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| format_err!("missing value for --{}", name))?;
    T::from_str(raw).map_err(|_| format_err!("could not parse --{} '{}'", name, raw))
}

struct LogProgress {
    total: u64,
    reported: u64,
}

impl ProgressUpdater for LogProgress {
    fn init_progress(&mut self, total: u64) {
        self.total = total.max(1);
        self.reported = 0;
    }

    fn update_progress(&mut self, step: u64) {
        let percent = step * 100 / self.total;
        if percent >= self.reported + 10 {
            self.reported = percent - percent % 10;
            info!("{}% done", self.reported);
        }
    }
}

fn write_image(outfile: &str, image: &RgbImage) -> Result<(), Error> {
    let path = Path::new(outfile);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_ref().map(String::as_str) {
        Some("pnm") | Some("ppm") => {
            let output = BufWriter::new(File::create(&path)?);
            let mut encoder =
                PnmEncoder::new(output).with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary));
            encoder.encode(image.as_raw().as_slice(), image.width(), image.height(), ColorType::Rgb8)?;
        }
        _ => image.save(&path)?,
    }
    Ok(())
}

fn write_hdr(outfile: &str, image: &Rgb32FImage) -> Result<(), Error> {
    let output = BufWriter::new(File::create(Path::new(outfile))?);
    let pixels: Vec<_> = image.pixels().copied().collect();
    HdrEncoder::new(output).encode(&pixels, image.width() as usize, image.height() as usize)?;
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    let (width, height) = parse_pair::<u16>(&value::<String>(matches, SIZE)?, 'x')
        .ok_or_else(|| format_err!("Error parsing image dimensions"))?;
    let base = match matches.value_of(PRESET) {
        Some("spiral") => Flame::spiral(),
        _ => Flame::sierpinski(),
    };
    let flame = Flame {
        width: u32::from(width),
        height: u32::from(height),
        sample_density: value(matches, DENSITY)?,
        spatial_oversample: value(matches, SPATIAL)?,
        color_oversample: value(matches, COLOR)?,
        spatial_filter_radius: value(matches, RADIUS)?,
        cam_yaw: value(matches, YAW)?,
        cam_pitch: value(matches, PITCH)?,
        cam_perspective: value(matches, PERSPECTIVE)?,
        cam_dof: value(matches, DOF)?,
        ..base
    };
    let flame = if matches.is_present(PPU) {
        Flame {
            pixels_per_unit: value(matches, PPU)?,
            ..flame
        }
    } else {
        flame
    };
    let threads = if matches.is_present(THREADS) {
        value(matches, THREADS)?
    } else {
        num_cpus::get()
    };

    let mut renderer = FlameRenderer::with_config(flame, RendererConfig { threads });
    if matches.is_present(SEED) {
        renderer.set_random_source(Box::new(SeededSource(value(matches, SEED)?)));
    }
    renderer.set_progress_updater(Box::new(LogProgress {
        total: 1,
        reported: 0,
    }));

    let hdr = matches.value_of(HDR);
    let info = RenderInfo {
        render_hdr: hdr.is_some(),
        ..RenderInfo::for_flame(renderer.flame())
    };
    let rendered = renderer.render_flame(&info)?;

    let output = value::<String>(matches, OUTPUT)?;
    if let Some(image) = &rendered.image {
        write_image(&output, image)?;
        info!(file = output.as_str(), "wrote image");
    }
    if let (Some(file), Some(image)) = (hdr, &rendered.hdr_image) {
        write_hdr(file, image)?;
        info!(file, "wrote hdr image");
    }
    Ok(())
}

fn main() {
    let matches = args();
    let level = if matches.is_present(QUIET) {
        Level::WARN
    } else if matches.is_present(VERBOSE) {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&matches) {
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}
