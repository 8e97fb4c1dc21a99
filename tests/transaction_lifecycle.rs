//! Local and distributed transaction lifecycles through a session.

use sql_relay::mock::MockDriver;
use sql_relay::{
    Error, LocalSession, SimpleStatement, StatementDescriptor, TransactionOptions, XaBranchState,
    XaFlags, XaSession, Xid,
};

#[test]
fn back_to_back_local_transactions_on_one_session() {
    let driver = MockDriver::new();
    let observer = driver.clone();
    let mut session = LocalSession::new(driver);

    let update = StatementDescriptor::Simple(SimpleStatement::new("UPDATE t SET v = 1"));

    session.begin(&TransactionOptions::default()).unwrap();
    session.execute(&update).unwrap();
    session.commit().unwrap();

    session.begin(&TransactionOptions::default()).unwrap();
    session.execute(&update).unwrap();
    session.rollback().unwrap();

    let counts = observer.counts();
    assert_eq!(counts.begin, 2);
    assert_eq!(counts.commit, 1);
    assert_eq!(counts.rollback, 1);
}

#[test]
fn nested_begin_is_rejected_without_touching_the_driver() {
    let driver = MockDriver::new();
    let observer = driver.clone();
    let mut session = LocalSession::new(driver);

    session.begin(&TransactionOptions::default()).unwrap();
    let err = session.begin(&TransactionOptions::default()).unwrap_err();
    assert!(matches!(err, Error::IllegalTransactionState { .. }));
    assert_eq!(observer.counts().begin, 1);
}

#[test]
fn savepoint_partial_rollback() {
    let driver = MockDriver::new();
    let observer = driver.clone();
    let mut session = LocalSession::new(driver);
    session.begin(&TransactionOptions::default()).unwrap();

    session.create_savepoint("before_risky").unwrap();
    session.create_savepoint("mid").unwrap();

    session.rollback_to_savepoint("before_risky").unwrap();
    // rolling back released "mid"
    assert_eq!(
        session.release_savepoint("mid").unwrap_err(),
        Error::UnknownSavepoint("mid".to_string())
    );

    session.commit().unwrap();
    let counts = observer.counts();
    assert_eq!(counts.savepoint, 2);
    assert_eq!(counts.rollback_to_savepoint, 1);
}

#[test]
fn failed_commit_leaves_only_the_rollback_path() {
    let driver = MockDriver::new();
    driver.push_commit_result(Err(Error::Driver("connection lost".into())));
    let mut session = LocalSession::new(driver);

    session.begin(&TransactionOptions::default()).unwrap();
    assert_eq!(
        session.commit().unwrap_err(),
        Error::Driver("connection lost".into())
    );

    // statements are refused until the transaction is resolved: the pair
    // guard sees no active transaction
    assert!(!session.in_transaction());

    assert!(matches!(
        session.commit().unwrap_err(),
        Error::IllegalTransactionState { .. }
    ));
    session.rollback().unwrap();
    session.begin(&TransactionOptions::default()).unwrap();
}

#[test]
fn full_xa_branch_lifecycle() {
    let driver = MockDriver::new();
    let observer = driver.clone();
    let mut session = XaSession::new(driver);
    let xid = Xid::new(7, b"global-tx-1".to_vec(), b"branch-1".to_vec()).unwrap();

    session
        .xa_start(xid.clone(), XaFlags::NONE, &TransactionOptions::default())
        .unwrap();
    assert_eq!(session.xa_state(), XaBranchState::Active);

    let info = session.transaction_info().unwrap().clone();
    let xa = info.xa.unwrap();
    assert_eq!(&xa.xid, &xid);
    assert_eq!(xa.state, XaBranchState::Active);

    session.xa_end(&xid, XaFlags::SUCCESS).unwrap();
    session.xa_prepare(&xid).unwrap();
    session.xa_commit(&xid, XaFlags::NONE).unwrap();
    assert_eq!(session.xa_state(), XaBranchState::Committed);

    let counts = observer.counts();
    assert_eq!(counts.xa_start, 1);
    assert_eq!(counts.xa_end, 1);
    assert_eq!(counts.xa_prepare, 1);
    assert_eq!(counts.xa_commit, 1);
}

#[test]
fn one_phase_commit_skips_prepare() {
    let driver = MockDriver::new();
    let observer = driver.clone();
    let mut session = XaSession::new(driver);
    let xid = Xid::new(7, vec![1], vec![]).unwrap();

    session
        .xa_start(xid.clone(), XaFlags::NONE, &TransactionOptions::default())
        .unwrap();
    session.xa_end(&xid, XaFlags::SUCCESS).unwrap();
    session.xa_commit(&xid, XaFlags::ONE_PHASE).unwrap();

    let counts = observer.counts();
    assert_eq!(counts.xa_prepare, 0);
    assert_eq!(counts.xa_commit, 1);
}

#[test]
fn recovery_completes_branches_started_elsewhere() {
    let driver = MockDriver::new();
    let stranded = Xid::new(7, vec![0xAA; 8], vec![0x01]).unwrap();
    driver.set_recovered(vec![stranded.clone()]);
    let observer = driver.clone();
    let mut session = XaSession::new(driver);

    let recovered = session.xa_recover().unwrap();
    assert_eq!(recovered, vec![stranded.clone()]);

    // two-phase completion of a branch this session never started
    session.xa_commit(&stranded, XaFlags::NONE).unwrap();
    assert_eq!(session.xa_state(), XaBranchState::NoTransaction);
    assert_eq!(observer.counts().xa_commit, 1);

    // one-phase completion of a foreign branch is a protocol error
    let err = session
        .xa_commit(&stranded, XaFlags::ONE_PHASE)
        .unwrap_err();
    assert!(matches!(err, Error::XaProtocol(_)));
}

#[test]
fn tmfail_end_forces_rollback() {
    let driver = MockDriver::new();
    let observer = driver.clone();
    let mut session = XaSession::new(driver);
    let xid = Xid::new(7, vec![2], vec![]).unwrap();

    session
        .xa_start(xid.clone(), XaFlags::NONE, &TransactionOptions::default())
        .unwrap();
    session.xa_end(&xid, XaFlags::FAIL).unwrap();

    assert_eq!(session.xa_prepare(&xid).unwrap_err(), Error::RollbackOnly);
    session.xa_rollback(&xid).unwrap();
    assert_eq!(session.xa_state(), XaBranchState::RolledBack);
    assert_eq!(observer.counts().xa_rollback, 1);
}
