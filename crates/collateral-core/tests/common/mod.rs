#![allow(dead_code)]

use collateral_core::config::{AcquisitionSettings, AppConfig};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Incompressible filler so archives keep their size after a deflate rewrite.
pub fn noise(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x9E37_79B9;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 24) as u8
        })
        .collect()
}

pub fn pdf(len: usize) -> Vec<u8> {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.resize(len, b'0');
    data
}

pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

/// Asset set for one product under `<mirror>/assets/<code>/`.
pub fn write_product_assets(mirror: &Path, code: &str) {
    let dir = mirror.join("assets").join(code);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("c_{}.pdf", code)), pdf(2048)).unwrap();
    fs::write(dir.join(format!("{}_dimension.pdf", code)), pdf(1536)).unwrap();
    fs::write(dir.join("warranty.pdf"), pdf(1200)).unwrap();
    fs::write(dir.join("manual.pdf"), pdf(1500)).unwrap();
    fs::write(dir.join("thumb.png"), noise(5120)).unwrap();
    write_zip(
        &dir.join(format!("{}_dxf.zip", code)),
        &[("drawings/foo.dxf", noise(3000)), ("README.txt", b"see docs".to_vec())],
    );
    let step_name = format!("{}.stp", code);
    write_zip(&dir.join("model-3d.zip"), &[(step_name.as_str(), noise(3000))]);
}

pub const CATALOG: &str = r#"
[account]
username = "buyer"
password = "secret"

[[series]]
name = "Ring Lights"
url = "series/ring"
columns = ["Model", "Catalog", "PDF Drawing", "DXF", "Warranty Card"]

[[series.products]]
code = "ABC-100"
label = "ABC-100 white ring light"
thumbnail = "assets/ABC-100/thumb.png"
manuals = ["assets/ABC-100/manual.pdf"]
cad = "assets/ABC-100/model-3d.zip"
consent_gate = true
documents = { "Catalog" = "assets/ABC-100/c_ABC-100.pdf", "PDF Drawing" = "assets/ABC-100/ABC-100_dimension.pdf", "DXF" = "assets/ABC-100/ABC-100_dxf.zip", "Warranty Card" = "assets/ABC-100/warranty.pdf" }

[[series.products]]
code = "BAD-1"
label = "BAD-1 bar light"
thumbnail = "assets/BAD-1/thumb.png"
documents = { "Catalog" = "assets/BAD-1/c_BAD-1.pdf", "PDF Drawing" = "assets/BAD-1/BAD-1_dimension.pdf" }

[[series.products]]
code = "FLAKY-7"
label = "FLAKY-7 spot light"
thumbnail = "assets/FLAKY-7/thumb.png"
dropped_batches = 1
documents = { "Catalog" = "assets/FLAKY-7/c_FLAKY-7.pdf", "PDF Drawing" = "assets/FLAKY-7/FLAKY-7_dimension.pdf", "DXF" = "assets/FLAKY-7/FLAKY-7_dxf.zip" }

[[series.products]]
code = "GHOST-9"
label = "GHOST-9 discontinued"
hidden = true
"#;

/// A mirror holding [`CATALOG`] and its assets.
pub fn write_mirror(root: &Path) {
    for code in ["ABC-100", "BAD-1", "FLAKY-7"] {
        write_product_assets(root, code);
    }
    fs::write(root.join("catalog.toml"), CATALOG).unwrap();
}

pub fn test_config(output_root: &Path) -> AppConfig {
    AppConfig {
        output_root: output_root.to_path_buf(),
        username: Some("buyer".into()),
        password: Some("secret".into()),
        acquisition: AcquisitionSettings {
            max_attempts: 2,
            download_timeout_secs: 1,
            poll_interval_ms: 10,
            interaction_delay_ms: 0,
            retry_pause_ms: 0,
        },
        ..AppConfig::default()
    }
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
