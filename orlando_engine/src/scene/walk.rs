use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The eight facing directions, indexed the way person resources list them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    #[default]
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Accepts `0..=7` or a compass abbreviation (`N`, `NE`, ...).
    pub fn parse(token: &str) -> Option<Self> {
        if let Ok(index) = token.parse::<usize>() {
            return Self::ALL.get(index).copied();
        }
        Some(match token {
            "N" => Direction::North,
            "NE" => Direction::NorthEast,
            "E" => Direction::East,
            "SE" => Direction::SouthEast,
            "S" => Direction::South,
            "SW" => Direction::SouthWest,
            "W" => Direction::West,
            "NW" => Direction::NorthWest,
            _ => return None,
        })
    }

    /// Facing for a step of `(dx, dy)`; `None` when not moving.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        Some(match (dx.signum(), dy.signum()) {
            (0, 0) => return None,
            (0, -1) => Direction::North,
            (1, -1) => Direction::NorthEast,
            (1, 0) => Direction::East,
            (1, 1) => Direction::SouthEast,
            (0, 1) => Direction::South,
            (-1, 1) => Direction::SouthWest,
            (-1, 0) => Direction::West,
            _ => Direction::NorthWest,
        })
    }
}

/// Move at most `speed` pixels along each axis towards `to`.
pub fn step_towards(from: Point, to: Point, speed: i32) -> Point {
    let speed = speed.max(1);
    let dx = (to.x - from.x).clamp(-speed, speed);
    let dy = (to.y - from.y).clamp(-speed, speed);
    Point::new(from.x + dx, from.y + dy)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkPolygon {
    points: Vec<Point>,
}

impl WalkPolygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Even-odd test; points on an edge count as inside.
    pub fn contains(&self, p: Point) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        if self.edges().any(|(a, b)| on_segment(a, b, p)) {
            return true;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let cross_x = a.x as i64
                    + (p.y - a.y) as i64 * (b.x - a.x) as i64 / (b.y - a.y) as i64;
                if (p.x as i64) < cross_x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Closest point on the outline, with its squared distance.
    pub fn nearest_edge_point(&self, p: Point) -> Option<(Point, i64)> {
        self.edges()
            .map(|(a, b)| {
                let q = closest_on_segment(a, b, p);
                (q, distance_sq(p, q))
            })
            .min_by_key(|(_, dist)| *dist)
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let count = self.points.len();
        (0..count).map(move |i| (self.points[i], self.points[(i + 1) % count]))
    }
}

fn distance_sq(a: Point, b: Point) -> i64 {
    let dx = (a.x - b.x) as i64;
    let dy = (a.y - b.y) as i64;
    dx * dx + dy * dy
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) as i64 * (p.y - a.y) as i64 - (b.y - a.y) as i64 * (p.x - a.x) as i64;
    cross == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

fn closest_on_segment(a: Point, b: Point, p: Point) -> Point {
    let (abx, aby) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let len_sq = abx * abx + aby * aby;
    if len_sq == 0.0 {
        return a;
    }
    let t = (((p.x - a.x) as f64 * abx + (p.y - a.y) as f64 * aby) / len_sq).clamp(0.0, 1.0);
    Point::new(
        (a.x as f64 + t * abx).round() as i32,
        (a.y as f64 + t * aby).round() as i32,
    )
}

/// Walkable floor of a scene. With no polygons every point is walkable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkMap {
    polygons: Vec<WalkPolygon>,
}

impl WalkMap {
    pub fn new(polygons: Vec<WalkPolygon>) -> Self {
        Self { polygons }
    }

    pub fn polygons(&self) -> &[WalkPolygon] {
        &self.polygons
    }

    pub fn contains(&self, p: Point) -> bool {
        self.polygons.is_empty() || self.polygons.iter().any(|poly| poly.contains(p))
    }

    /// `p` itself when walkable, otherwise the nearest point on any outline.
    pub fn clamp(&self, p: Point) -> Point {
        if self.contains(p) {
            return p;
        }
        self.polygons
            .iter()
            .filter_map(|poly| poly.nearest_edge_point(p))
            .min_by_key(|(_, dist)| *dist)
            .map(|(q, _)| q)
            .unwrap_or(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> WalkPolygon {
        WalkPolygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(0, 100),
        ])
    }

    #[test]
    fn polygon_containment_includes_edges() {
        let poly = square();
        assert!(poly.contains(Point::new(50, 50)));
        assert!(poly.contains(Point::new(100, 40)));
        assert!(!poly.contains(Point::new(101, 40)));
        assert!(!poly.contains(Point::new(-5, -5)));
    }

    #[test]
    fn clamp_snaps_to_the_nearest_edge() {
        let map = WalkMap::new(vec![square()]);
        assert_eq!(map.clamp(Point::new(20, 30)), Point::new(20, 30));
        assert_eq!(map.clamp(Point::new(150, 40)), Point::new(100, 40));
        assert_eq!(map.clamp(Point::new(-10, -10)), Point::new(0, 0));
        assert_eq!(WalkMap::default().clamp(Point::new(-10, 5)), Point::new(-10, 5));
    }

    #[test]
    fn steps_move_diagonally_then_straight() {
        let mut at = Point::new(0, 0);
        let goal = Point::new(10, 4);
        at = step_towards(at, goal, 3);
        assert_eq!(at, Point::new(3, 3));
        assert_eq!(Direction::from_delta(3, 3), Some(Direction::SouthEast));
        at = step_towards(at, goal, 3);
        assert_eq!(at, Point::new(6, 4));
        at = step_towards(at, goal, 3);
        at = step_towards(at, goal, 3);
        assert_eq!(at, goal);
        assert_eq!(Direction::from_delta(0, 0), None);
    }

    #[test]
    fn directions_parse_from_index_or_name() {
        assert_eq!(Direction::parse("2"), Some(Direction::East));
        assert_eq!(Direction::parse("NW"), Some(Direction::NorthWest));
        assert_eq!(Direction::parse("9"), None);
        assert_eq!(Direction::parse("UP"), None);
    }
}
