use std::error::Error;

use tracing::info;
use tracing_subscriber::EnvFilter;

use spcm_backend::{ini_file, minimal_spcm_ini, EventRecord, ParId, ParValue};
use spcmctrl_backend::{dump_state, Spcm};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let spcm = Spcm::mock();
    let ini = ini_file(&minimal_spcm_ini(150))?;
    spcm.init(ini.path())?;

    spcm.set_parameter(0, ParId::Mode, ParValue::Int(1))?;
    spcm.set_parameter(0, ParId::CollectTime, ParValue::Float(0.05))?;
    spcm.set_parameter(0, ParId::StopOnTime, ParValue::Int(1))?;
    let init_vars = spcm.get_fifo_init_vars(0)?;
    info!(%init_vars, "FIFO stream");

    spcm.start_measurement(0)?;
    let mut words = Vec::new();
    let mut buf = vec![0u16; 4096];
    loop {
        let armed = spcm.test_state(0)?.contains(spcm_backend::MeasurementState::ARMED);
        let n = spcm.read_fifo(0, &mut buf)?;
        words.extend_from_slice(&buf[..n]);
        if !armed && n == 0 {
            break;
        }
    }
    let photons = spcm_backend::records_from_words(&words)
        .into_iter()
        .map(EventRecord::decode)
        .filter(EventRecord::is_photon)
        .count();
    info!(words = words.len(), photons, "acquisition finished");

    let mut out = std::io::stdout().lock();
    dump_state(&spcm, Some(&[0]), &mut out)?;
    spcm.close()?;
    Ok(())
}
