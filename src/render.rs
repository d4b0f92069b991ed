use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::body::Body;
use crate::bounds::Boundary;

/// Writes one SVG frame for `iteration`: the 850x850 canvas maps the
/// simulation square onto an 800-unit viewport with a 25-unit margin.
/// Failures are the caller's to log; they never stop the run.
pub fn write_frame(
    dir: &Path,
    iteration: usize,
    bodies: &[Body],
    boundary: &Boundary,
) -> io::Result<PathBuf> {
    let path = dir.join(format!("frame_{iteration:04}.svg"));
    let mut out = BufWriter::new(File::create(&path)?);
    writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 850 850">"#
    )?;
    let side = boundary.side();
    let scale = if side > 0.0 { 800.0 / side } else { 1.0 };
    for body in bodies {
        let cx = (body.pos.x - boundary.min.x) * scale + 25.0;
        let cy = (body.pos.y - boundary.min.y) * scale + 25.0;
        let fill = match body.color {
            1 => "blue",
            2 => "orange",
            _ => "black",
        };
        writeln!(
            out,
            r#"  <circle cx="{cx}" cy="{cy}" r="10" fill="{fill}"/>"#
        )?;
    }
    writeln!(out, "</svg>")?;
    out.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultraviolet::DVec2;

    #[test]
    fn frame_lists_every_body_with_its_colour() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bodies = vec![
            Body::new(DVec2::new(0.0, 0.0), DVec2::zero(), 1.0, 1),
            Body::new(DVec2::new(10.0, 10.0), DVec2::zero(), 1.0, 2),
            Body::new(DVec2::new(5.0, 5.0), DVec2::zero(), 1.0, 0),
        ];
        let boundary = Boundary::reduce(&bodies, 1);

        let path = write_frame(dir.path(), 3, &bodies, &boundary).expect("frame");
        assert!(path.ends_with("frame_0003.svg"));

        let svg = std::fs::read_to_string(path).expect("read frame");
        assert!(svg.contains(r#"viewBox="0 0 850 850""#));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains(r#"fill="blue""#));
        assert!(svg.contains(r#"fill="orange""#));
        assert!(svg.contains(r#"fill="black""#));
        // corner body lands on the margin, the far corner at 825
        assert!(svg.contains(r#"cx="25" cy="25""#));
        assert!(svg.contains(r#"cx="825" cy="825""#));
    }
}
