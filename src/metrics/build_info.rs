use prometheus::{IntGaugeVec, Opts, Registry};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registers `nodepool_exporter_build_info{version="..."} 1`.
pub fn register(registry: &Registry) -> anyhow::Result<()> {
    let opts = Opts::new(
        "build_info",
        "A metric with a constant '1' value labeled by the version from which nodepool_exporter was built.",
    )
    .namespace("nodepool_exporter");

    let build_info = IntGaugeVec::new(opts, &["version"])?;
    build_info.with_label_values(&[VERSION]).set(1);
    registry.register(Box::new(build_info))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::util::tests::sample;
    use prometheus::TextEncoder;

    #[test]
    fn test_build_info() {
        let registry = Registry::new();
        register(&registry).unwrap();

        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();

        let series = format!(r#"nodepool_exporter_build_info{{version="{}"}}"#, VERSION);
        assert_eq!(sample(&text, &series), Some(1.0));
    }

    #[test]
    fn test_build_info_registers_once() {
        let registry = Registry::new();
        register(&registry).unwrap();
        assert!(register(&registry).is_err());
    }
}
