/// Training Center XML parser
///
/// Walks the document top-down (Activities -> Activity -> Lap -> Track ->
/// Trackpoint) and builds the owned model from `tcx_model`.
///
/// Mandatory fields abort the whole parse. Optional trackpoint fields fall
/// back to the previous trackpoint of the same lap, or to hard defaults for
/// the first trackpoint of a lap.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use roxmltree::{Document, Node};
use tracing::{debug, info};

use crate::local_time::{CentralEuropeanTime, LocalTimeConverter};
use crate::tcx_model::{Activity, Database, Lap, Position, Trackpoint, DEFAULT_SENSOR_STATE};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing mandatory field '{field}' in <{element}>")]
    MissingField { field: String, element: &'static str },

    #[error("invalid value '{value}' for field '{field}' in <{element}>")]
    InvalidValue {
        field: String,
        element: &'static str,
        value: String,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Namespace of the root element, detected once per document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamespaceContext {
    uri: Option<String>,
}

/// Slash separated child path qualified with the document namespace
#[derive(Debug, Clone, PartialEq)]
pub struct TagPath<'ns> {
    namespace: Option<&'ns str>,
    steps: Vec<&'ns str>,
}

impl NamespaceContext {
    pub fn detect(root: Node) -> Self {
        NamespaceContext {
            uri: root.tag_name().namespace().map(str::to_string),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Map a short path like `"Track/Trackpoint"` to a qualified query
    pub fn path<'ns>(&'ns self, path: &'ns str) -> TagPath<'ns> {
        TagPath {
            namespace: self.uri.as_deref(),
            steps: path
                .split('/')
                .filter(|step| !step.is_empty() && *step != ".")
                .collect(),
        }
    }
}

impl<'ns> TagPath<'ns> {
    fn matches(&self, node: &Node, step: &str) -> bool {
        node.is_element()
            && node.tag_name().name() == step
            && node.tag_name().namespace() == self.namespace
    }

    /// All elements reached by the path, in document order
    pub fn find_all<'a, 'input>(&self, node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
        let mut current = vec![node];
        for step in &self.steps {
            current = current
                .into_iter()
                .flat_map(|parent| parent.children().filter(move |child| self.matches(child, step)))
                .collect();
        }
        current
    }

    pub fn find<'a, 'input>(&self, node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
        self.find_all(node).into_iter().next()
    }
}

pub struct TcxParser<C: LocalTimeConverter> {
    converter: C,
}

impl TcxParser<CentralEuropeanTime> {
    pub fn new() -> Self {
        Self::with_converter(CentralEuropeanTime)
    }
}

impl Default for TcxParser<CentralEuropeanTime> {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a TCX file with the default local time rule
pub fn parse_file(path: &Path) -> Result<Database> {
    TcxParser::new().parse_file(path)
}

/// Parse TCX content with the default local time rule
pub fn parse_str(xml: &str) -> Result<Database> {
    TcxParser::new().parse_str(xml)
}

impl<C: LocalTimeConverter> TcxParser<C> {
    pub fn with_converter(converter: C) -> Self {
        TcxParser { converter }
    }

    pub fn parse_file(&self, path: &Path) -> Result<Database> {
        info!("Reading activity file: {}", path.display());
        let content = fs::read_to_string(path)?;
        self.parse_str(&content)
    }

    pub fn parse_str(&self, xml: &str) -> Result<Database> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        let ns = NamespaceContext::detect(root);
        debug!("Root <{}> namespace: {:?}", root.tag_name().name(), ns.uri());

        let walker = DocumentWalker { ns: &ns, converter: &self.converter };
        let mut activities = Vec::new();
        for node in ns.path("Activities/Activity").find_all(root) {
            activities.push(walker.parse_activity(node)?);
        }

        info!(
            "Parsed {} activities ({} trackpoints)",
            activities.len(),
            activities.iter().map(Activity::trackpoint_count).sum::<usize>()
        );
        Ok(Database { activities })
    }
}

/// Per-document state: the detected namespace and the time converter
struct DocumentWalker<'p, C: LocalTimeConverter> {
    ns: &'p NamespaceContext,
    converter: &'p C,
}

impl<'p, C: LocalTimeConverter> DocumentWalker<'p, C> {
    fn parse_activity(&self, node: Node) -> Result<Activity> {
        let sport = required_attribute(node, "Sport", "Activity")?;
        let id = self.required_text(node, "Id", "Activity")?;

        let mut laps = Vec::new();
        for lap_node in self.ns.path("Lap").find_all(node) {
            laps.push(self.parse_lap(lap_node)?);
        }

        debug!("Activity {} ({}): {} laps", id, sport, laps.len());
        Ok(Activity { sport, id, laps })
    }

    fn parse_lap(&self, node: Node) -> Result<Lap> {
        let start_time = self.convert_time(&required_attribute(node, "StartTime", "Lap")?, "StartTime", "Lap")?;

        let total_secs: f64 = self.required_value(node, "TotalTimeSeconds", "Lap")?;
        let distance_m = self.required_value(node, "DistanceMeters", "Lap")?;
        let max_speed = self.required_value(node, "MaximumSpeed", "Lap")?;
        let calories = self.required_value(node, "Calories", "Lap")?;

        let avg_heart_rate_bpm = self.optional_value(node, "AverageHeartRateBpm/Value").unwrap_or(0);
        let max_heart_rate_bpm = self.optional_value(node, "MaximumHeartRateBpm/Value").unwrap_or(0);

        let intensity = self.required_text(node, "Intensity", "Lap")?;
        let trigger_method = self.required_text(node, "TriggerMethod", "Lap")?;

        // Fallback only ever looks at earlier trackpoints of this lap
        let mut trackpoints: Vec<Trackpoint> = Vec::new();
        for tp_node in self.ns.path("Track/Trackpoint").find_all(node) {
            let trackpoint = self.parse_trackpoint(tp_node, trackpoints.last())?;
            trackpoints.push(trackpoint);
        }

        debug!("Lap {}: {} trackpoints", start_time, trackpoints.len());
        Ok(Lap {
            start_time,
            total_time: Duration::seconds(total_secs.trunc() as i64),
            distance_m,
            max_speed,
            calories,
            avg_heart_rate_bpm,
            max_heart_rate_bpm,
            intensity,
            trigger_method,
            trackpoints,
        })
    }

    fn parse_trackpoint(&self, node: Node, prev: Option<&Trackpoint>) -> Result<Trackpoint> {
        let time_text = self.required_text(node, "Time", "Trackpoint")?;
        let time = self.convert_time(&time_text, "Time", "Trackpoint")?;

        let position = match self.ns.path("Position").find(node) {
            Some(position_node) => self.parse_position(position_node)?,
            None => prev.map(|p| p.position).unwrap_or_default(),
        };

        let altitude_m = self
            .optional_value(node, "AltitudeMeters")
            .or_else(|| prev.map(|p| p.altitude_m))
            .unwrap_or(0.0);
        let distance_m = self
            .optional_value(node, "DistanceMeters")
            .or_else(|| prev.map(|p| p.distance_m))
            .unwrap_or(0.0);
        let heart_rate_bpm = self
            .optional_value(node, "HeartRateBpm/Value")
            .or_else(|| prev.map(|p| p.heart_rate_bpm))
            .unwrap_or(0);
        let sensor_state = self
            .text_at(node, "SensorState")
            .map(str::to_string)
            .or_else(|| prev.map(|p| p.sensor_state.clone()))
            .unwrap_or_else(|| DEFAULT_SENSOR_STATE.to_string());

        Ok(Trackpoint {
            time,
            position,
            altitude_m,
            distance_m,
            heart_rate_bpm,
            sensor_state,
        })
    }

    fn parse_position(&self, node: Node) -> Result<Position> {
        Ok(Position {
            latitude: self.required_value(node, "LatitudeDegrees", "Position")?,
            longitude: self.required_value(node, "LongitudeDegrees", "Position")?,
        })
    }

    fn convert_time(&self, text: &str, field: &str, element: &'static str) -> Result<DateTime<FixedOffset>> {
        let utc = NaiveDateTime::parse_from_str(text, TIME_FORMAT).map_err(|_| ParseError::InvalidValue {
            field: field.to_string(),
            element,
            value: text.to_string(),
        })?;
        Ok(self.converter.to_local(utc))
    }

    /// Trimmed, non-empty text of the first element at `path`
    fn text_at<'a>(&self, node: Node<'a, '_>, path: &str) -> Option<&'a str> {
        self.ns
            .path(path)
            .find(node)
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn required_text(&self, node: Node, path: &str, element: &'static str) -> Result<String> {
        self.text_at(node, path)
            .map(str::to_string)
            .ok_or_else(|| ParseError::MissingField { field: path.to_string(), element })
    }

    fn required_value<T: FromStr>(&self, node: Node, path: &str, element: &'static str) -> Result<T> {
        let text = self.required_text(node, path, element)?;
        text.parse().map_err(|_| ParseError::InvalidValue {
            field: path.to_string(),
            element,
            value: text.clone(),
        })
    }

    /// Missing and unparsable values are both treated as absent
    fn optional_value<T: FromStr>(&self, node: Node, path: &str) -> Option<T> {
        self.text_at(node, path).and_then(|text| text.parse().ok())
    }
}

fn required_attribute(node: Node, name: &str, element: &'static str) -> Result<String> {
    node.attribute(name)
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingField { field: name.to_string(), element })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TCX_NS: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2";

    fn wrap(ns_attr: &str, laps: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase {ns_attr}>
  <Activities>
    <Activity Sport="Running">
      <Id>2009-10-11T08:00:00Z</Id>
      {laps}
    </Activity>
  </Activities>
</TrainingCenterDatabase>"#
        )
    }

    fn lap(trackpoints: &str) -> String {
        format!(
            r#"<Lap StartTime="2009-10-11T08:00:00Z">
        <TotalTimeSeconds>1800.75</TotalTimeSeconds>
        <DistanceMeters>5000.0</DistanceMeters>
        <MaximumSpeed>4.0</MaximumSpeed>
        <Calories>300</Calories>
        <AverageHeartRateBpm><Value>150</Value></AverageHeartRateBpm>
        <Intensity>Active</Intensity>
        <TriggerMethod>Distance</TriggerMethod>
        <Track>{trackpoints}</Track>
      </Lap>"#
        )
    }

    fn namespaced(laps: &str) -> String {
        wrap(&format!(r#"xmlns="{}""#, TCX_NS), laps)
    }

    const FULL_POINT: &str = r#"<Trackpoint>
          <Time>2009-10-11T08:00:05Z</Time>
          <Position><LatitudeDegrees>48.1</LatitudeDegrees><LongitudeDegrees>11.5</LongitudeDegrees></Position>
          <AltitudeMeters>520.5</AltitudeMeters>
          <DistanceMeters>12.0</DistanceMeters>
          <HeartRateBpm><Value>120</Value></HeartRateBpm>
          <SensorState>Present</SensorState>
        </Trackpoint>"#;

    const BARE_POINT: &str = r#"<Trackpoint><Time>2009-10-11T08:00:10Z</Time></Trackpoint>"#;

    #[test]
    fn test_parse_namespaced_document() {
        let xml = namespaced(&lap(FULL_POINT));
        let db = parse_str(&xml).unwrap();

        assert_eq!(db.activities.len(), 1);
        let activity = &db.activities[0];
        assert_eq!(activity.sport, "Running");
        assert_eq!(activity.id, "2009-10-11T08:00:00Z");

        let lap = &activity.laps[0];
        assert_eq!(lap.total_time, Duration::seconds(1800));
        assert_eq!(lap.distance_m, 5000.0);
        assert_eq!(lap.calories, 300);
        assert_eq!(lap.avg_heart_rate_bpm, 150);
        assert_eq!(lap.max_heart_rate_bpm, 0);
        assert_eq!(lap.trigger_method, "Distance");
        assert_eq!(lap.start_time.format("%H:%M:%S").to_string(), "10:00:00");

        let tp = &lap.trackpoints[0];
        assert_eq!(tp.position, Position { latitude: 48.1, longitude: 11.5 });
        assert_eq!(tp.altitude_m, 520.5);
        assert_eq!(tp.distance_m, 12.0);
        assert_eq!(tp.heart_rate_bpm, 120);
        assert_eq!(tp.sensor_state, "Present");
    }

    #[test]
    fn test_parse_without_namespace() {
        let xml = wrap("", &lap(FULL_POINT));
        let db = parse_str(&xml).unwrap();
        assert_eq!(db.activities[0].laps[0].trackpoints.len(), 1);
    }

    #[test]
    fn test_foreign_namespace_elements_ignored() {
        let point = r#"<Trackpoint>
          <Time>2009-10-11T08:00:05Z</Time>
          <x:DistanceMeters xmlns:x="urn:other">999.0</x:DistanceMeters>
        </Trackpoint>"#;
        let xml = namespaced(&lap(point));
        let db = parse_str(&xml).unwrap();
        assert_eq!(db.activities[0].laps[0].trackpoints[0].distance_m, 0.0);
    }

    #[test]
    fn test_first_trackpoint_defaults() {
        let xml = namespaced(&lap(BARE_POINT));
        let db = parse_str(&xml).unwrap();
        let tp = &db.activities[0].laps[0].trackpoints[0];

        assert_eq!(tp.position, Position::default());
        assert_eq!(tp.altitude_m, 0.0);
        assert_eq!(tp.distance_m, 0.0);
        assert_eq!(tp.heart_rate_bpm, 0);
        assert_eq!(tp.sensor_state, "Absent");
    }

    #[test]
    fn test_missing_fields_inherit_previous() {
        let partial = r#"<Trackpoint>
          <Time>2009-10-11T08:00:15Z</Time>
          <DistanceMeters>30.0</DistanceMeters>
          <HeartRateBpm><Value>not-a-number</Value></HeartRateBpm>
        </Trackpoint>"#;
        let xml = namespaced(&lap(&format!("{}{}{}", FULL_POINT, BARE_POINT, partial)));
        let db = parse_str(&xml).unwrap();
        let tps = &db.activities[0].laps[0].trackpoints;
        assert_eq!(tps.len(), 3);

        for pair in tps.windows(2) {
            assert_eq!(pair[1].position, pair[0].position);
            assert_eq!(pair[1].altitude_m, pair[0].altitude_m);
            assert_eq!(pair[1].heart_rate_bpm, pair[0].heart_rate_bpm);
            assert_eq!(pair[1].sensor_state, pair[0].sensor_state);
        }
        assert_eq!(tps[1].distance_m, 12.0);
        assert_eq!(tps[2].distance_m, 30.0);
        assert!(tps[2].time > tps[1].time);
    }

    #[test]
    fn test_no_fallback_across_laps() {
        let laps = format!("{}{}", lap(FULL_POINT), lap(BARE_POINT));
        let db = parse_str(&namespaced(&laps)).unwrap();
        let second = &db.activities[0].laps[1].trackpoints[0];
        assert_eq!(second.heart_rate_bpm, 0);
        assert_eq!(second.sensor_state, "Absent");
    }

    #[test]
    fn test_fallback_spans_tracks_of_a_lap() {
        let tracks = format!("{}</Track><Track>{}", FULL_POINT, BARE_POINT);
        let db = parse_str(&namespaced(&lap(&tracks))).unwrap();
        let tps = &db.activities[0].laps[0].trackpoints;
        assert_eq!(tps.len(), 2);
        assert_eq!(tps[1].heart_rate_bpm, 120);
    }

    #[test]
    fn test_missing_mandatory_lap_field() {
        let xml = namespaced(&lap(FULL_POINT)).replace("<Calories>300</Calories>", "");
        match parse_str(&xml) {
            Err(ParseError::MissingField { field, element }) => {
                assert_eq!(field, "Calories");
                assert_eq!(element, "Lap");
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_mandatory_value() {
        let xml = namespaced(&lap(FULL_POINT)).replace("<MaximumSpeed>4.0<", "<MaximumSpeed>fast<");
        assert!(matches!(
            parse_str(&xml),
            Err(ParseError::InvalidValue { element: "Lap", .. })
        ));
    }

    #[test]
    fn test_missing_trackpoint_time() {
        let point = "<Trackpoint><DistanceMeters>5.0</DistanceMeters></Trackpoint>";
        let err = parse_str(&namespaced(&lap(point))).unwrap_err();
        assert_eq!(err.to_string(), "missing mandatory field 'Time' in <Trackpoint>");
    }

    #[test]
    fn test_missing_sport_attribute() {
        let xml = namespaced(&lap(FULL_POINT)).replace(r#" Sport="Running""#, "");
        assert!(matches!(
            parse_str(&xml),
            Err(ParseError::MissingField { element: "Activity", .. })
        ));
    }

    #[test]
    fn test_fractional_seconds_accepted() {
        let point = "<Trackpoint><Time>2009-10-11T08:00:05.500Z</Time></Trackpoint>";
        let db = parse_str(&namespaced(&lap(point))).unwrap();
        assert_eq!(
            db.activities[0].laps[0].trackpoints[0].time.format("%H:%M:%S%.3f").to_string(),
            "10:00:05.500"
        );
    }

    struct UtcClock;

    impl LocalTimeConverter for UtcClock {
        fn to_local(&self, utc: NaiveDateTime) -> DateTime<FixedOffset> {
            utc.and_utc().fixed_offset()
        }
    }

    #[test]
    fn test_custom_time_converter() {
        let db = TcxParser::with_converter(UtcClock).parse_str(&namespaced(&lap(FULL_POINT))).unwrap();
        let lap = &db.activities[0].laps[0];
        assert_eq!(lap.start_time.format("%H:%M:%S").to_string(), "08:00:00");
        assert_eq!(lap.trackpoints[0].time.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(parse_str("<TrainingCenterDatabase>"), Err(ParseError::Xml(_))));
    }

    #[test]
    fn test_namespace_path_steps() {
        let ctx = NamespaceContext { uri: Some(TCX_NS.to_string()) };
        let path = ctx.path("./Track/Trackpoint");
        assert_eq!(path.steps, vec!["Track", "Trackpoint"]);
        assert_eq!(path.namespace, Some(TCX_NS));
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(namespaced(&lap(FULL_POINT)).as_bytes()).unwrap();
        let db = parse_file(file.path()).unwrap();
        assert_eq!(db.activities[0].laps.len(), 1);

        let missing = parse_file(Path::new("/nonexistent/activity.tcx"));
        assert!(matches!(missing, Err(ParseError::Io(_))));
    }
}
