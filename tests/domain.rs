use ipdc_ldes_mirror::domain::{LocalPage, OriginPage, parse_page_number, to_local};

#[test]
fn origin_pages_shift_by_one() {
    for origin in [0, 1, 24, 1_000] {
        assert_eq!(to_local(Some(OriginPage::new(origin))).get(), origin + 1);
        assert_eq!(OriginPage::new(origin).to_local().to_origin(), OriginPage::new(origin));
    }
}

#[test]
fn unusable_page_numbers_map_to_first_file() {
    for raw in ["", "abc", "-1", "  "] {
        assert_eq!(to_local(parse_page_number(raw)), LocalPage::SENTINEL, "{raw:?}");
    }
    assert_eq!(to_local(parse_page_number("0")), LocalPage::SENTINEL);
}

#[test]
fn relative_references() {
    assert_eq!(OriginPage::new(4).to_local().relative_ref(), "./5");
    assert_eq!(LocalPage::SENTINEL.relative_ref(), "./1");
}

#[test]
fn origin_page_parses_strictly() {
    assert_eq!("7".parse::<OriginPage>().unwrap(), OriginPage::new(7));
    assert!("7a".parse::<OriginPage>().is_err());
    assert!("-1".parse::<OriginPage>().is_err());
}

#[test]
fn largest_page_number_has_no_successor() {
    let last = OriginPage::new(u64::MAX);
    assert_eq!(last.next(), None);
    assert_eq!(OriginPage::new(4).next(), Some(OriginPage::new(5)));
    assert_eq!(to_local(Some(last)), LocalPage::SENTINEL);
    assert_eq!(
        to_local(parse_page_number("18446744073709551615")),
        LocalPage::SENTINEL
    );
    // one past u64::MAX does not parse at all
    assert_eq!(parse_page_number("18446744073709551616"), None);
}
