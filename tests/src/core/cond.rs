use xjit_core::Cond;

#[test]
fn cond_invert() {
    assert_eq!(Cond::E.invert(), Cond::Ne);
    assert_eq!(Cond::Ne.invert(), Cond::E);
    assert_eq!(Cond::L.invert(), Cond::Ge);
    assert_eq!(Cond::Be.invert(), Cond::A);
    assert_eq!(Cond::P.invert(), Cond::Np);
    assert_eq!(Cond::O.invert(), Cond::No);
    assert_eq!(Cond::C.invert(), Cond::NC);
}

#[test]
fn cond_invert_is_involution() {
    for code in 0..16 {
        let c = Cond::from_code(code).unwrap();
        assert_eq!(c.invert().invert(), c);
        assert_ne!(c.invert(), c);
    }
}

#[test]
fn cond_codes() {
    assert_eq!(Cond::O.code(), 0x0);
    assert_eq!(Cond::B.code(), 0x2);
    assert_eq!(Cond::E.code(), 0x4);
    assert_eq!(Cond::S.code(), 0x8);
    assert_eq!(Cond::G.code(), 0xF);
    assert_eq!(Cond::Z, Cond::E);
    assert_eq!(Cond::NZ, Cond::Ne);

    for code in 0..16 {
        assert_eq!(Cond::from_code(code).unwrap().code(), code);
    }
    assert_eq!(Cond::from_code(16), None);
}
