use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use common::{ProjectId, ResourceId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    HealthMonitor, Listener, LoadBalancer, LoadBalancerTree, Member, MonitorType, Pool, Protocol,
    ProvisioningStatus,
};
use repository::{InMemoryRepository, Repository};
use tasks::propagate::subtree_order;
use tasks::StatusPropagator;

async fn seed(repo: &InMemoryRepository, pools: usize, members: usize) -> ResourceId {
    let project = ProjectId::new("bench");
    let lb = LoadBalancer::new(project.clone());
    let lb_id = lb.id;
    repo.insert_load_balancer(lb).await;

    for p in 0..pools {
        let pool = Pool::new(lb_id, project.clone());
        let pool_id = pool.id;
        repo.insert_pool(pool).await;
        repo.insert_health_monitor(HealthMonitor::new(pool_id, project.clone(), MonitorType::Tcp))
            .await;
        for m in 0..members {
            let address = IpAddr::V4(Ipv4Addr::new(10, 0, p as u8, m as u8 + 1));
            repo.insert_member(Member::new(pool_id, project.clone(), address, 80))
                .await;
        }
        let mut listener = Listener::new(lb_id, project.clone(), Protocol::Http, 8000 + p as u16);
        listener.default_pool_id = Some(pool_id);
        repo.insert_listener(listener).await;
    }
    lb_id
}

fn load_tree(pools: usize, members: usize) -> (tokio::runtime::Runtime, Arc<InMemoryRepository>, LoadBalancerTree) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let tree = rt.block_on(async {
        let lb_id = seed(&repo, pools, members).await;
        repo.get_load_balancer_tree(lb_id).await.unwrap()
    });
    (rt, repo, tree)
}

fn bench_subtree_order(c: &mut Criterion) {
    let (_rt, _repo, tree) = load_tree(10, 20);

    c.bench_function("propagate/subtree_order_10x20", |b| {
        b.iter(|| subtree_order(&tree));
    });
}

fn bench_mark_tree(c: &mut Criterion) {
    let (rt, repo, tree) = load_tree(10, 20);
    let propagator = StatusPropagator::new(repo);

    c.bench_function("propagate/mark_tree_10x20", |b| {
        b.iter(|| {
            rt.block_on(async {
                propagator.mark_tree(&tree, ProvisioningStatus::Active).await;
            });
        });
    });
}

criterion_group!(benches, bench_subtree_order, bench_mark_tree);
criterion_main!(benches);
