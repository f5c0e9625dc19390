use anyhow::Result;
use gkslo::{Dms, Engine, GeographicCoord, HeightMode, ProjectedCoord};
use std::io::Write;

use crate::EngineArgs;

/// Zgornji Lehen na Pohorju, as published for ETRS89, D96/TM and D48/GK.
const WGS: (f64, f64, f64) = (46.5375852874, 15.3015019823, 0.0);
const TM: (f64, f64, f64) = (155_370.642, 523_125.803, -47.474);
const GK: (f64, f64, f64) = (154_885.259, 523_494.788, -47.474);

pub fn run(engine_args: &EngineArgs) -> Result<()> {
    let engine = super::build_engine(engine_args)?;
    report(&engine, engine_args.height, std::io::stdout().lock())
}

fn geo(out: &mut impl Write, arrow: &str, g: &GeographicCoord) -> Result<()> {
    writeln!(out, "{arrow} lat: {:.10}  lon: {:.10}  h: {:.3}", g.lat, g.lon, g.h)?;
    writeln!(
        out,
        "    {}  {}",
        Dms::from_degrees(g.lat),
        Dms::from_degrees(g.lon)
    )?;
    Ok(())
}

fn xy(out: &mut impl Write, arrow: &str, p: &ProjectedCoord) -> Result<()> {
    writeln!(out, "{arrow} x: {:.3}  y: {:.3}  H: {:.3}", p.x, p.y, p.h)?;
    Ok(())
}

/// Convert the reference point through every full conversion and round
/// trip, writing inputs and results.
fn report(engine: &Engine, mode: HeightMode, mut out: impl Write) -> Result<()> {
    let wgs = GeographicCoord::new(WGS.0, WGS.1, WGS.2);
    let tm = ProjectedCoord::new(TM.0, TM.1, TM.2);
    let gk = ProjectedCoord::new(GK.0, GK.1, GK.2);

    writeln!(out, "== Reference point (height mode {mode})")?;
    geo(&mut out, "WGS84 ", &wgs)?;
    xy(&mut out, "D96/TM", &tm)?;
    xy(&mut out, "D48/GK", &gk)?;

    writeln!(out, "== D48/GK -> WGS84")?;
    xy(&mut out, "<--", &gk)?;
    let g = engine.gk_to_wgs(&gk, mode);
    geo(&mut out, "-->", &g)?;
    writeln!(out, "== result -> D96/TM")?;
    xy(&mut out, "-->", &engine.wgs_to_tm(&g, mode))?;
    writeln!(out, "== result -> D48/GK (back)")?;
    xy(&mut out, "-->", &engine.wgs_to_gk(&g, mode))?;

    writeln!(out, "== WGS84 -> D48/GK")?;
    geo(&mut out, "<--", &wgs)?;
    xy(&mut out, "-->", &engine.wgs_to_gk(&wgs, mode))?;

    writeln!(out, "== D96/TM -> WGS84")?;
    xy(&mut out, "<--", &tm)?;
    let g = engine.tm_to_wgs(&tm, mode);
    geo(&mut out, "-->", &g)?;
    writeln!(out, "== result -> D48/GK")?;
    xy(&mut out, "-->", &engine.wgs_to_gk(&g, mode))?;
    writeln!(out, "== result -> D96/TM (back)")?;
    xy(&mut out, "-->", &engine.wgs_to_tm(&g, mode))?;

    writeln!(out, "== WGS84 -> D96/TM")?;
    geo(&mut out, "<--", &wgs)?;
    xy(&mut out, "-->", &engine.wgs_to_tm(&wgs, mode))?;

    writeln!(out, "== D96/TM -> D48/GK")?;
    xy(&mut out, "<--", &tm)?;
    xy(&mut out, "-->", &engine.tm_to_gk(&tm, mode))?;

    writeln!(out, "== D48/GK -> D96/TM")?;
    xy(&mut out, "<--", &gk)?;
    xy(&mut out, "-->", &engine.gk_to_tm(&gk, mode))?;

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// `x` and `y` of a `--> x: .. y: .. H: ..` line.
    fn parse_xy(line: &str) -> (f64, f64) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        (fields[2].parse().unwrap(), fields[4].parse().unwrap())
    }

    #[test]
    fn test_report_reproduces_reference() {
        let engine = Engine::without_data();
        let mut out = Vec::new();
        report(&engine, HeightMode::Copied, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let results: Vec<&str> = text.lines().filter(|l| l.starts_with("-->")).collect();
        assert_eq!(results.len(), 10);

        // Printed with 3 decimals, chain error below a millimetre
        // WGS84 -> D48/GK and D96/TM -> D48/GK land on the published GK point
        for i in [3, 8] {
            let (x, y) = parse_xy(results[i]);
            assert_abs_diff_eq!(x, GK.0, epsilon = 2e-3);
            assert_abs_diff_eq!(y, GK.1, epsilon = 2e-3);
        }
        // WGS84 -> D96/TM and D48/GK -> D96/TM land on the published TM point
        for i in [7, 9] {
            let (x, y) = parse_xy(results[i]);
            assert_abs_diff_eq!(x, TM.0, epsilon = 2e-3);
            assert_abs_diff_eq!(y, TM.1, epsilon = 2e-3);
        }
        assert!(text.contains("lat: 46.53758528"));
    }
}
