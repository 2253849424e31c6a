//! Serializes samples into time-series write commands.
//!
//! Each field of a sample maps to its own series. The first time a series is
//! seen it gets a full `TS.ADD` line carrying its labels; afterwards only the
//! `key ts value` triple is written, and all such triples of one sample are
//! folded into a single `TS.MADD` line.

use crate::point::{Sample, Value};
use crate::registry::LabelRegistry;
use crate::wire;
use bytes::{BufMut, BytesMut};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

pub struct PointEncoder {
    registry: Arc<LabelRegistry>,
}

impl PointEncoder {
    pub fn new(registry: Arc<LabelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &LabelRegistry {
        &self.registry
    }

    /// Encodes `sample` and writes the result with one `write_all` call.
    ///
    /// Creation lines come first, in field order, followed by at most one
    /// `TS.MADD` line holding every repeat sighting of the sample. A sample
    /// without fields writes nothing.
    pub fn encode<W: Write>(&self, sample: &Sample, writer: &mut W) -> io::Result<()> {
        let canonical = canonical_labels(&sample.tags);
        let hash = wire::label_hash(&canonical);
        let labels = label_fragment(sample);
        let ts = sample.unix_timestamp();

        let mut lines = BytesMut::with_capacity(256);
        let mut fragments = BytesMut::with_capacity(128);

        for (field, value) in &sample.fields {
            let key = wire::series_key(&sample.measurement, field, hash);
            let identity = format!("{}_{}{}", sample.measurement, field, canonical);

            if self.registry.mark_if_absent(&identity) {
                lines.put_slice(wire::ADD.as_bytes());
                lines.put_u8(b' ');
                put_triple(&mut lines, &key, ts, value);
                lines.put_slice(&labels);
                lines.put_u8(b' ');
                lines.put_slice(wire::FIELDNAME_LABEL.as_bytes());
                lines.put_u8(b' ');
                lines.put_slice(field.as_bytes());
                lines.put_u8(b'\n');
            } else {
                put_triple(&mut fragments, &key, ts, value);
                fragments.put_u8(b' ');
            }
        }

        if let Some(last) = fragments.last_mut() {
            *last = b'\n';
            lines.put_slice(wire::MADD.as_bytes());
            lines.put_u8(b' ');
            lines.put_slice(&fragments);
        }

        if lines.is_empty() {
            return Ok(());
        }
        writer.write_all(&lines)
    }
}

/// `{k1=v1|k2=v2}` in tag order, or the empty string for an untagged sample.
pub fn canonical_labels(tags: &[(String, Value)]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(64);
    out.push('{');
    for (i, (k, v)) in tags.iter().enumerate() {
        if i > 0 {
            out.push('|');
        }
        let _ = write!(out, "{}={}", k, v);
    }
    out.push('}');
    out
}

// " LABELS k1 v1 ... measurement <name>"
fn label_fragment(sample: &Sample) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_u8(b' ');
    buf.put_slice(wire::LABELS.as_bytes());
    for (k, v) in &sample.tags {
        buf.put_u8(b' ');
        buf.put_slice(k.as_bytes());
        buf.put_u8(b' ');
        put_value(&mut buf, v);
    }
    buf.put_u8(b' ');
    buf.put_slice(wire::MEASUREMENT_LABEL.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(sample.measurement.as_bytes());
    buf
}

fn put_triple(buf: &mut BytesMut, key: &str, ts: i64, value: &Value) {
    buf.put_slice(key.as_bytes());
    buf.put_u8(b' ');
    // BytesMut grows on demand, so fmt writes into it cannot fail.
    let _ = write!(buf, "{}", ts);
    buf.put_u8(b' ');
    put_value(buf, value);
}

fn put_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::String(s) => buf.put_slice(s.as_bytes()),
        other => {
            let _ = write!(buf, "{}", other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn cpu_sample(ts: i64, usage_user: i64) -> Sample {
        Sample::new("cpu", Utc.timestamp_opt(ts, 0).unwrap())
            .tag("host", "host_0")
            .tag("region", "eu-1")
            .field("usage_user", usage_user)
    }

    fn encode_to_string(enc: &PointEncoder, sample: &Sample) -> String {
        let mut out = Vec::new();
        enc.encode(sample, &mut out).expect("encode");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn creation_then_multi_add() {
        let enc = PointEncoder::new(Arc::new(LabelRegistry::new()));
        let hash = wire::label_hash("{host=host_0|region=eu-1}");

        let first = encode_to_string(&enc, &cpu_sample(1451606400, 58));
        assert_eq!(
            first,
            format!(
                "TS.ADD cpu_usage_user{{{}}} 1451606400 58 LABELS host host_0 region eu-1 measurement cpu fieldname usage_user\n",
                hash
            )
        );

        let second = encode_to_string(&enc, &cpu_sample(1451606410, 62));
        assert_eq!(
            second,
            format!("TS.MADD cpu_usage_user{{{}}} 1451606410 62\n", hash)
        );
    }

    #[test]
    fn key_ignores_values_and_timestamp() {
        let a = Sample::new("mem", Utc.timestamp_opt(10, 0).unwrap())
            .tag("host", "h")
            .field("used", 1.5);
        let b = Sample::new("mem", Utc.timestamp_opt(99, 0).unwrap())
            .tag("host", "h")
            .field("used", 7i64);
        let key_of = |s: &Sample| {
            let enc = PointEncoder::new(Arc::new(LabelRegistry::new()));
            let text = encode_to_string(&enc, s);
            wire::split_command(&text).unwrap().args[0].to_string()
        };
        assert_eq!(key_of(&a), key_of(&b));

        let reordered = Sample::new("mem", Utc.timestamp_opt(10, 0).unwrap())
            .tag("zone", "z")
            .tag("host", "h")
            .field("used", 1.5);
        let swapped = Sample::new("mem", Utc.timestamp_opt(10, 0).unwrap())
            .tag("host", "h")
            .tag("zone", "z")
            .field("used", 1.5);
        assert_ne!(key_of(&reordered), key_of(&swapped));
    }

    #[test]
    fn labels_written_exactly_once_per_series() {
        let enc = PointEncoder::new(Arc::new(LabelRegistry::new()));
        let mut out = Vec::new();
        for i in 0..5 {
            enc.encode(&cpu_sample(1451606400 + i * 10, 50 + i), &mut out)
                .unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines.iter().filter(|l| l.contains(" LABELS ")).count(), 1);
        assert_eq!(lines.iter().filter(|l| l.starts_with("TS.MADD ")).count(), 4);
        assert_eq!(enc.registry().len(), 1);
    }

    #[test]
    fn mixed_sightings_keep_multi_add_to_fragment_run() {
        let enc = PointEncoder::new(Arc::new(LabelRegistry::new()));
        let hash = wire::label_hash("{host=h}");
        let t = Utc.timestamp_opt(100, 0).unwrap();

        encode_to_string(&enc, &Sample::new("cpu", t).tag("host", "h").field("a", 1i64));
        let mixed = encode_to_string(
            &enc,
            &Sample::new("cpu", t)
                .tag("host", "h")
                .field("a", 2i64)
                .field("b", 3i64)
                .field("c", 4i64),
        );
        let expected = format!(
            "TS.ADD cpu_b{{{h}}} 100 3 LABELS host h measurement cpu fieldname b\n\
             TS.ADD cpu_c{{{h}}} 100 4 LABELS host h measurement cpu fieldname c\n\
             TS.MADD cpu_a{{{h}}} 100 2\n",
            h = hash
        );
        assert_eq!(mixed, expected);
        for line in mixed.lines() {
            let cmd = wire::split_command(line).unwrap();
            assert!(cmd.name == wire::ADD || cmd.name == wire::MADD);
            if cmd.name == wire::MADD {
                assert_eq!(cmd.args.len() % 3, 0);
            }
        }
    }

    #[test]
    fn untagged_sample_hashes_empty_labels() {
        let enc = PointEncoder::new(Arc::new(LabelRegistry::new()));
        let s = Sample::new("disk", Utc.timestamp_opt(5, 0).unwrap()).field("free", 0.5);
        assert_eq!(
            encode_to_string(&enc, &s),
            format!(
                "TS.ADD disk_free{{{}}} 5 0.5 LABELS measurement disk fieldname free\n",
                wire::label_hash("")
            )
        );
    }

    #[test]
    fn sample_without_fields_writes_nothing() {
        let enc = PointEncoder::new(Arc::new(LabelRegistry::new()));
        let s = Sample::new("cpu", Utc.timestamp_opt(5, 0).unwrap()).tag("host", "h");
        assert_eq!(encode_to_string(&enc, &s), "");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_surface() {
        let enc = PointEncoder::new(Arc::new(LabelRegistry::new()));
        let err = enc
            .encode(&cpu_sample(1451606400, 1), &mut BrokenPipe)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn canonical_labels_join_in_order() {
        let tags = vec![
            ("host".to_string(), Value::from("host_0")),
            ("rack".to_string(), Value::Integer(3)),
        ];
        assert_eq!(canonical_labels(&tags), "{host=host_0|rack=3}");
        assert_eq!(canonical_labels(&[]), "");
    }
}
