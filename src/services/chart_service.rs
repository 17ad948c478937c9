// Chart decision, chart code interpretation and figure rendering
use crate::models::{ChartKind, ChartSpec, Figure, Layout, ResultSet, Trace};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("Unrecognized chart code: {0}")]
    Parse(String),

    #[error("Unsupported chart type: {0}")]
    UnsupportedKind(String),

    #[error("Chart needs a `{0}` column")]
    MissingArgument(&'static str),

    #[error("Column not found in result: {0}")]
    MissingColumn(String),

    #[error("Column is not numeric: {0}")]
    NotNumeric(String),
}

/// A chart is worth generating for more than one row with at least one
/// numeric column.
pub fn should_generate_chart(result: &ResultSet) -> bool {
    result.row_count() > 1 && result.has_numeric_column()
}

fn px_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)px\.(\w+)\s*\((.*)\)").expect("valid px call pattern"))
}

fn keyword_arg() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid keyword argument pattern")
    })
}

fn strip_fences(code: &str) -> &str {
    let code = code.trim();
    let code = code
        .strip_prefix("```python")
        .or_else(|| code.strip_prefix("```json"))
        .or_else(|| code.strip_prefix("```"))
        .unwrap_or(code);
    code.strip_suffix("```").unwrap_or(code).trim()
}

/// Decode chart code into a chart spec.
///
/// Accepts either a JSON object (`{"type": "bar", "x": .., "y": ..}`) or a
/// Plotly Express call such as `fig = px.bar(df, x="genre", y="total")`.
/// Only string keyword arguments are read from a call.
pub fn parse_chart_code(code: &str) -> Result<ChartSpec, ChartError> {
    let code = strip_fences(code);

    if code.starts_with('{') {
        return serde_json::from_str::<ChartSpec>(code).map_err(|e| ChartError::Parse(e.to_string()));
    }

    let call = px_call()
        .captures(code)
        .ok_or_else(|| ChartError::Parse("no px.<chart>(...) call found".to_string()))?;
    let name = &call[1];
    let kind = ChartKind::from_name(name).ok_or_else(|| ChartError::UnsupportedKind(name.to_string()))?;

    let mut args: BTreeMap<String, String> = BTreeMap::new();
    for arg in keyword_arg().captures_iter(&call[2]) {
        let value = arg.get(2).or_else(|| arg.get(3)).map(|m| m.as_str().to_string());
        if let Some(value) = value {
            args.insert(arg[1].to_string(), value);
        }
    }

    // Pie charts name their axes `names` and `values`
    let (x, y) = match kind {
        ChartKind::Pie => (
            args.remove("names").or_else(|| args.remove("x")),
            args.remove("values").or_else(|| args.remove("y")),
        ),
        _ => (args.remove("x"), args.remove("y")),
    };

    Ok(ChartSpec {
        kind,
        x,
        y,
        color: args.remove("color"),
        title: args.remove("title"),
    })
}

/// Render a chart spec against the result it was generated for
pub fn render(spec: &ChartSpec, result: &ResultSet) -> Result<Figure, ChartError> {
    let x_name = spec.x.as_deref().ok_or(ChartError::MissingArgument("x"))?;
    let x = column(result, x_name)?;

    let mut layout = Layout {
        title: spec.title.clone(),
        xaxis_title: Some(x_name.to_string()),
        yaxis_title: None,
    };

    let data = match spec.kind {
        ChartKind::Histogram => {
            let mut trace = Trace::new("histogram");
            trace.x = Some(x);
            vec![trace]
        }
        ChartKind::Pie => {
            let y_name = spec.y.as_deref().ok_or(ChartError::MissingArgument("y"))?;
            let values = numeric_column(result, y_name)?;
            let mut trace = Trace::new("pie");
            trace.labels = Some(x);
            trace.values = Some(values);
            layout.xaxis_title = None;
            vec![trace]
        }
        kind => {
            let y_name = spec.y.as_deref().ok_or(ChartError::MissingArgument("y"))?;
            let y = numeric_column(result, y_name)?;
            layout.yaxis_title = Some(y_name.to_string());

            match spec.color.as_deref() {
                Some(color_name) => {
                    let groups = column(result, color_name)?;
                    grouped_traces(kind, &x, &y, &groups)
                }
                None => vec![xy_trace(kind, None, x, y)],
            }
        }
    };

    Ok(Figure { data, layout })
}

/// Parse and render in one step
pub fn render_code(code: &str, result: &ResultSet) -> Result<Figure, ChartError> {
    render(&parse_chart_code(code)?, result)
}

fn column(result: &ResultSet, name: &str) -> Result<Vec<Value>, ChartError> {
    result
        .column_values(name)
        .ok_or_else(|| ChartError::MissingColumn(name.to_string()))
}

fn numeric_column(result: &ResultSet, name: &str) -> Result<Vec<Value>, ChartError> {
    let info = result
        .column(name)
        .ok_or_else(|| ChartError::MissingColumn(name.to_string()))?;
    if !info.data_type.is_numeric() {
        return Err(ChartError::NotNumeric(name.to_string()));
    }
    column(result, name)
}

fn xy_trace(kind: ChartKind, name: Option<String>, x: Vec<Value>, y: Vec<Value>) -> Trace {
    let mut trace = match kind {
        ChartKind::Bar => Trace::new("bar"),
        ChartKind::Line => {
            let mut t = Trace::new("scatter");
            t.mode = Some("lines".to_string());
            t
        }
        ChartKind::Area => {
            let mut t = Trace::new("scatter");
            t.mode = Some("lines".to_string());
            t.fill = Some("tozeroy".to_string());
            t
        }
        _ => {
            let mut t = Trace::new("scatter");
            t.mode = Some("markers".to_string());
            t
        }
    };
    trace.name = name;
    trace.x = Some(x);
    trace.y = Some(y);
    trace
}

/// One trace per distinct value of the color column, in first-seen order
fn grouped_traces(kind: ChartKind, x: &[Value], y: &[Value], groups: &[Value]) -> Vec<Trace> {
    let mut order: Vec<String> = Vec::new();
    let mut points: BTreeMap<String, (Vec<Value>, Vec<Value>)> = BTreeMap::new();

    for ((x, y), group) in x.iter().zip(y).zip(groups) {
        let label = match group {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => other.to_string(),
        };
        let entry = points.entry(label.clone()).or_insert_with(|| {
            order.push(label);
            (Vec::new(), Vec::new())
        });
        entry.0.push(x.clone());
        entry.1.push(y.clone());
    }

    order
        .into_iter()
        .filter_map(|label| {
            let (xs, ys) = points.remove(&label)?;
            Some(xy_trace(kind, Some(label), xs, ys))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales(rows: usize) -> ResultSet {
        let regions = ["north", "south"];
        ResultSet::from_positional(
            vec!["month".into(), "region".into(), "total".into()],
            vec![],
            (0..rows)
                .map(|i| vec![json!(format!("2024-0{}", i + 1)), json!(regions[i % 2]), json!(i as f64 * 1.5)])
                .collect(),
        )
    }

    fn names_only(rows: usize) -> ResultSet {
        ResultSet::from_positional(
            vec!["artist".into()],
            vec![],
            (0..rows).map(|i| vec![json!(format!("artist {}", i))]).collect(),
        )
    }

    #[test]
    fn test_chart_predicate() {
        assert!(!should_generate_chart(&sales(1)));
        assert!(should_generate_chart(&sales(5)));
        assert!(!should_generate_chart(&names_only(5)));
        assert!(!should_generate_chart(&ResultSet::default()));
    }

    #[test]
    fn test_parse_px_call() {
        let code = "```python\nimport plotly.express as px\nfig = px.bar(df, x=\"month\", y='total', title=\"Sales by month\")\n```";
        let spec = parse_chart_code(code).unwrap();
        assert_eq!(spec.kind, ChartKind::Bar);
        assert_eq!(spec.x.as_deref(), Some("month"));
        assert_eq!(spec.y.as_deref(), Some("total"));
        assert_eq!(spec.title.as_deref(), Some("Sales by month"));
        assert_eq!(spec.color, None);
    }

    #[test]
    fn test_parse_pie_call() {
        let spec = parse_chart_code("fig = px.pie(df, names='region', values='total')").unwrap();
        assert_eq!(spec.kind, ChartKind::Pie);
        assert_eq!(spec.x.as_deref(), Some("region"));
        assert_eq!(spec.y.as_deref(), Some("total"));
    }

    #[test]
    fn test_parse_json_spec() {
        let spec = parse_chart_code(r#"{"type": "line", "x": "month", "y": "total", "color": "region"}"#).unwrap();
        assert_eq!(spec.kind, ChartKind::Line);
        assert_eq!(spec.color.as_deref(), Some("region"));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(parse_chart_code("print('hello')"), Err(ChartError::Parse(_))));
        assert!(matches!(
            parse_chart_code("fig = px.sunburst(df, path=['a'])"),
            Err(ChartError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn test_render_bar() {
        let spec = parse_chart_code("fig = px.bar(df, x='month', y='total')").unwrap();
        let figure = render(&spec, &sales(3)).unwrap();
        assert_eq!(figure.data.len(), 1);
        assert_eq!(figure.data[0].trace_type, "bar");
        assert_eq!(figure.data[0].y.as_ref().unwrap().len(), 3);
        assert_eq!(figure.layout.yaxis_title.as_deref(), Some("total"));
    }

    #[test]
    fn test_render_grouped_lines() {
        let figure = render_code(r#"{"type":"line","x":"month","y":"total","color":"region"}"#, &sales(5)).unwrap();
        assert_eq!(figure.data.len(), 2);
        assert_eq!(figure.data[0].name.as_deref(), Some("north"));
        assert_eq!(figure.data[0].x.as_ref().unwrap().len(), 3);
        assert_eq!(figure.data[1].x.as_ref().unwrap().len(), 2);
        assert_eq!(figure.data[0].mode.as_deref(), Some("lines"));
    }

    #[test]
    fn test_render_pie_and_histogram() {
        let pie = render_code("px.pie(df, names='region', values='total')", &sales(4)).unwrap();
        assert_eq!(pie.data[0].trace_type, "pie");
        assert!(pie.data[0].labels.is_some());

        let hist = render_code("px.histogram(df, x='total')", &sales(4)).unwrap();
        assert_eq!(hist.data[0].trace_type, "histogram");
    }

    #[test]
    fn test_render_errors() {
        let rs = sales(3);
        assert_eq!(
            render_code("px.bar(df, x='month', y='missing')", &rs).err(),
            Some(ChartError::MissingColumn("missing".to_string()))
        );
        assert_eq!(
            render_code("px.bar(df, x='total', y='region')", &rs).err(),
            Some(ChartError::NotNumeric("region".to_string()))
        );
        assert_eq!(
            render_code("px.bar(df, y='total')", &rs).err(),
            Some(ChartError::MissingArgument("x"))
        );
    }

    #[test]
    fn test_figure_serializes_like_plotly() {
        let figure = render_code("px.scatter(df, x='month', y='total', title='t')", &sales(2)).unwrap();
        let value = serde_json::to_value(&figure).unwrap();
        assert_eq!(value["data"][0]["type"], "scatter");
        assert_eq!(value["data"][0]["mode"], "markers");
        assert_eq!(value["layout"]["title"], "t");
        assert!(value["data"][0].get("labels").is_none());
    }
}
