// Landmark recordings are JSON lines, one frame per line:
//
//     {"t": 0.033, "landmarks": [[0.51, 0.12], [0.52, 0.11], ...]}
//     {"t": 0.066, "landmarks": null}
//
// `t` is seconds since the start of the recording; landmarks are in the extractor's
// index order.

use anyhow::{bail, Context, Result};
use rep_vision::{Landmarks, Point, PoseFrame};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct RecordedLine {
    t: f64,
    landmarks: Option<Vec<[f64; 2]>>,
}

pub fn load(path: &str, origin: Instant) -> Result<Vec<PoseFrame>> {
    let file = File::open(path).with_context(|| format!("opening recording {path}"))?;
    parse(BufReader::new(file), origin).with_context(|| format!("reading recording {path}"))
}

pub fn parse(reader: impl BufRead, origin: Instant) -> Result<Vec<PoseFrame>> {
    let mut frames = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RecordedLine =
            serde_json::from_str(&line).with_context(|| format!("line {}", number + 1))?;
        let Ok(offset) = Duration::try_from_secs_f64(record.t) else {
            bail!("line {}: invalid timestamp {}", number + 1, record.t);
        };
        let timestamp = origin + offset;
        frames.push(match record.landmarks {
            Some(points) => {
                let points: Vec<Point> =
                    points.into_iter().map(|[x, y]| Point::new(x, y)).collect();
                PoseFrame::detected(Landmarks::from_points(&points), timestamp)
            }
            None => PoseFrame::missing(timestamp),
        });
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rep_vision::BodyJoint;

    #[test]
    fn parses_present_and_missing_frames() {
        let origin = Instant::now();
        let text = concat!(
            "{\"t\": 0.0, \"landmarks\": [[0.5, 0.1], [0.4, 0.2]]}\n",
            "\n",
            "{\"t\": 0.5, \"landmarks\": null}\n",
        );
        let frames = parse(text.as_bytes(), origin).unwrap();

        assert_eq!(frames.len(), 2);
        let first = frames[0].pose().unwrap();
        assert_eq!(first.get(BodyJoint::Nose), Some(Point::new(0.5, 0.1)));
        assert_eq!(first.get(BodyJoint::LeftHip), None);
        assert!(frames[1].pose().is_none());
        assert_eq!(frames[1].timestamp - origin, Duration::from_millis(500));
    }

    #[test]
    fn rejects_negative_timestamps() {
        let text = "{\"t\": -1.0, \"landmarks\": null}";
        assert!(parse(text.as_bytes(), Instant::now()).is_err());
    }
}
