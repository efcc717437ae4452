use std::{env, fmt::Write, fs, path::PathBuf};

const SIZE_VAR: &str = "SMART_EEPROM_CONFIG_SIZE";
const DEFAULT_SIZE: usize = 4096;

// Must stay in sync with `CAPACITY_TABLE` in `src/fuses.rs`.
const SUPPORTED_SIZES: [usize; 9] = [0, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536];

fn main() -> Result<(), String> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed={SIZE_VAR}");

    let size = match env::var(SIZE_VAR) {
        Ok(value) => parse_size(&value)?,
        Err(env::VarError::NotPresent) => DEFAULT_SIZE,
        Err(e) => return Err(format!("{SIZE_VAR} is not valid unicode: {e}")),
    };

    if !SUPPORTED_SIZES.contains(&size) {
        return Err(format!(
            "{SIZE_VAR}={size} is not a SmartEEPROM size the NVMCTRL fuses can express. \
             Supported sizes: {SUPPORTED_SIZES:?}"
        ));
    }

    println!("cargo:rustc-env={SIZE_VAR}={size}");

    write_config_table(size)
}

fn parse_size(value: &str) -> Result<usize, String> {
    let value = value.trim();
    match value.as_bytes() {
        [b'0', b'x', ..] => usize::from_str_radix(&value[2..], 16),
        _ => value.parse::<usize>(),
    }
    .map_err(|_| format!("Invalid unsigned numerical value for {SIZE_VAR}: {value}"))
}

fn write_config_table(size: usize) -> Result<(), String> {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").ok_or("OUT_DIR is not set")?);

    let mut table = String::from(
        "\n| Name | Description | Default value | Selected value |\n\
         |------|-------------|---------------|----------------|\n",
    );
    writeln!(
        table,
        "| **{SIZE_VAR}** | Emulated EEPROM capacity in bytes. Selects the SEEPSZ/SEESBLK fuses \
         programmed by `SmartEeprom::init`. | {DEFAULT_SIZE} | {size} |"
    )
    .map_err(|e| e.to_string())?;

    fs::write(out_dir.join("smart_eeprom_config_table.md"), table).map_err(|e| e.to_string())
}
