use crate::card::{CARD_HEIGHT_PX, CARD_WIDTH_PX};
use crate::types::{Pt, Size};

/// Row-pairs per page; each row holds one front/back pair, so a full
/// page carries `2 * ROWS_PER_PAGE` card images.
pub const ROWS_PER_PAGE: usize = 5;

/// Print-layout geometry for one document: computed once, reused for
/// every page. Cards keep the template's fixed aspect ratio; the fit
/// is row-constrained by default and width-constrained only when a
/// card pair would overflow the usable page width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardGeometry {
    pub page: Size,
    pub margin: Pt,
    pub gutter_h: Pt,
    pub gutter_v: Pt,
    pub card_width: Pt,
    pub card_height: Pt,
}

/// Placement of one row-pair: front on the left, back on the right,
/// the pair centered horizontally. `y` is the bottom edge in PDF page
/// space (origin at the bottom-left corner).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotPosition {
    pub x_front: Pt,
    pub x_back: Pt,
    pub y: Pt,
}

impl CardGeometry {
    /// The fixed page contract: ISO A4, 10 mm margins, 0.3 cm gutters.
    pub fn a4() -> CardGeometry {
        CardGeometry::compute(
            Size::a4(),
            Pt::from_mm(10.0),
            Pt::from_cm(0.3),
            Pt::from_cm(0.3),
        )
    }

    pub fn compute(page: Size, margin: Pt, gutter_h: Pt, gutter_v: Pt) -> CardGeometry {
        let usable_width = page.width - margin * 2;
        let usable_height = page.height - margin * 2 - gutter_v * (ROWS_PER_PAGE as i32 - 1);

        // Row-constrained fit: the row count dictates the card height.
        // Divisions floor at milli precision so the stack and the pair
        // never overflow the usable area by a rounding step.
        let mut card_height = div_floor(usable_height, ROWS_PER_PAGE as i64);
        let mut card_width = card_height.mul_ratio(CARD_WIDTH_PX as i32, CARD_HEIGHT_PX as i32);

        // Width-constrained fit: applied only when the pair overflows.
        let pair_width = card_width * 2 + gutter_h;
        if pair_width > usable_width {
            card_width = div_floor(usable_width - gutter_h, 2);
            card_height = card_width.mul_ratio(CARD_HEIGHT_PX as i32, CARD_WIDTH_PX as i32);
        }

        CardGeometry {
            page,
            margin,
            gutter_h,
            gutter_v,
            card_width,
            card_height,
        }
    }

    pub fn pair_width(&self) -> Pt {
        self.card_width * 2 + self.gutter_h
    }

    pub fn slot(&self, row: usize) -> SlotPosition {
        let x_front = (self.page.width - self.pair_width()) / 2;
        let x_back = x_front + self.card_width + self.gutter_h;
        let y = self.page.height
            - self.margin
            - (self.card_height + self.gutter_v) * row as i32
            - self.card_height;
        SlotPosition { x_front, x_back, y }
    }
}

fn div_floor(value: Pt, divisor: i64) -> Pt {
    if divisor == 0 {
        return Pt::ZERO;
    }
    Pt::from_milli_i64(value.to_milli_i64().div_euclid(divisor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_contained(geometry: &CardGeometry) {
        let usable_width = geometry.page.width - geometry.margin * 2;
        let usable_height = geometry.page.height - geometry.margin * 2;
        assert!(
            geometry.pair_width() <= usable_width,
            "pair {:?} exceeds usable width {:?}",
            geometry.pair_width(),
            usable_width
        );
        let stack_height =
            geometry.card_height * ROWS_PER_PAGE as i32 + geometry.gutter_v * (ROWS_PER_PAGE as i32 - 1);
        assert!(
            stack_height <= usable_height,
            "stack {:?} exceeds usable height {:?}",
            stack_height,
            usable_height
        );
    }

    fn assert_aspect(geometry: &CardGeometry) {
        let ratio = geometry.card_width.to_f32() / geometry.card_height.to_f32();
        let expected = CARD_WIDTH_PX as f32 / CARD_HEIGHT_PX as f32;
        assert!(
            (ratio - expected).abs() < 0.001,
            "aspect {ratio} != {expected}"
        );
    }

    #[test]
    fn a4_fit_is_row_constrained_and_contained() {
        let geometry = CardGeometry::a4();
        assert_contained(&geometry);
        assert_aspect(&geometry);
        // On A4 the row constraint binds: five rows fill the usable
        // height exactly (within milli rounding).
        let usable_height = geometry.page.height
            - geometry.margin * 2
            - geometry.gutter_v * (ROWS_PER_PAGE as i32 - 1);
        let stack = geometry.card_height * ROWS_PER_PAGE as i32;
        assert!((usable_height - stack).to_milli_i64().abs() <= 5);
    }

    #[test]
    fn narrow_page_switches_to_width_constrained_fit() {
        let geometry = CardGeometry::compute(
            Size::from_mm(120.0, 297.0),
            Pt::from_mm(10.0),
            Pt::from_cm(0.3),
            Pt::from_cm(0.3),
        );
        assert_contained(&geometry);
        assert_aspect(&geometry);
        // The pair now spans the full usable width.
        let usable_width = geometry.page.width - geometry.margin * 2;
        assert!((usable_width - geometry.pair_width()).to_milli_i64().abs() <= 5);
    }

    #[test]
    fn geometry_is_identical_across_recomputation() {
        assert_eq!(CardGeometry::a4(), CardGeometry::a4());
    }

    #[test]
    fn slots_stack_top_down_and_center_pairs() {
        let geometry = CardGeometry::a4();
        let first = geometry.slot(0);
        let second = geometry.slot(1);
        // Row 0 sits at the top of the page; PDF y decreases downward
        // in page coordinates measured from the bottom.
        assert!(first.y > second.y);
        let step = first.y - second.y;
        assert_eq!(
            step.to_milli_i64(),
            (geometry.card_height + geometry.gutter_v).to_milli_i64()
        );
        // Pair centered: left margin equals right margin.
        let left = first.x_front;
        let right = geometry.page.width - (first.x_back + geometry.card_width);
        assert!((left - right).to_milli_i64().abs() <= 1);
        // Top card touches the top margin.
        let top_edge = first.y + geometry.card_height;
        assert_eq!(
            (geometry.page.height - top_edge).to_milli_i64(),
            geometry.margin.to_milli_i64()
        );
    }

    #[test]
    fn last_row_clears_bottom_margin() {
        let geometry = CardGeometry::a4();
        let last = geometry.slot(ROWS_PER_PAGE - 1);
        assert!(last.y >= geometry.margin - Pt::from_milli_i64(5));
    }
}
