use carnetpress::{CarnetPress, CarnetPressError, Settings, Student};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "usage: carnetpress [--fonts DIR]... [--assets DIR] <roster.json> <settings.json> [out-dir]";

struct Args {
    roster: PathBuf,
    settings: PathBuf,
    out_dir: PathBuf,
    font_dirs: Vec<PathBuf>,
    asset_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut font_dirs = Vec::new();
    let mut asset_dir = None;
    let mut positional: Vec<PathBuf> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fonts" => {
                let dir = args.next().ok_or("--fonts needs a directory")?;
                font_dirs.push(PathBuf::from(dir));
            }
            "--assets" => {
                let dir = args.next().ok_or("--assets needs a directory")?;
                asset_dir = Some(PathBuf::from(dir));
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => {
                return Err(format!("unknown flag {other}\n{USAGE}"));
            }
            other => positional.push(PathBuf::from(other)),
        }
    }

    if positional.len() < 2 || positional.len() > 3 {
        return Err(USAGE.to_string());
    }
    let out_dir = positional
        .get(2)
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(Args {
        roster: positional[0].clone(),
        settings: positional[1].clone(),
        out_dir,
        font_dirs,
        asset_dir,
    })
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| format!("cannot parse {}: {e}", path.display()))
}

fn register_assets(press: &mut CarnetPress, dir: &PathBuf) -> Result<(), CarnetPressError> {
    let entries = std::fs::read_dir(dir)?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
            continue;
        };
        if !matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        let bytes = std::fs::read(&path)?;
        press.insert_image_bytes(name, &bytes)?;
    }
    Ok(())
}

fn run(args: Args) -> Result<(), String> {
    let roster: Vec<Student> = load_json(&args.roster)?;
    let settings: Settings = load_json(&args.settings)?;

    let mut builder = CarnetPress::builder();
    for dir in &args.font_dirs {
        builder = builder.register_font_dir(dir);
    }
    let mut press = builder.build().map_err(|e| e.to_string())?;
    if let Some(dir) = &args.asset_dir {
        register_assets(&mut press, dir).map_err(|e| e.to_string())?;
    }

    std::fs::create_dir_all(&args.out_dir)
        .map_err(|e| format!("cannot create {}: {e}", args.out_dir.display()))?;

    info!("generating carnets for {} students", roster.len());
    match press
        .generate_to_dir(&roster, &settings, &args.out_dir)
        .map_err(|e| e.to_string())?
    {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => {
            println!("roster is empty, nothing to generate");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("carnet generation failed: {message}");
            eprintln!("carnet generation failed: {message}");
            ExitCode::FAILURE
        }
    }
}
